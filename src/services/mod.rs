pub mod bucket;
pub mod fallback;
pub mod gcs_acl;
pub mod miss_cache;
pub mod object_management;
pub mod path_resolver;
pub mod remote_store;
pub mod storage_sync;
pub mod synchronization;

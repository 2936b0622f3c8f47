//! Built-in telemetry jobs.

mod endpoint_metadata;
mod process_tree;
mod search;
mod sync;

pub use endpoint_metadata::EndpointMetadataJob;
pub use process_tree::ProcessTreeJob;
pub use search::{
    SearchDevicesByIpJob, SearchDomainContactsJob, SearchFilesByHashJob, SearchFilesByPathJob,
    SearchNetworkContactsJob, SearchProcessesByCmdJob,
};
pub use sync::{SyncDetectionsJob, SyncHostsJob};

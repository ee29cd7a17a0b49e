pub mod albums;
pub mod dispatch;
pub mod multipart;
pub mod package;
pub mod photos;
pub mod reconcile;
pub mod upload;

pub use albums::AlbumService;
pub use dispatch::{DispatchOutcome, DispatchService, WorkerClient};
pub use multipart::MultipartService;
pub use package::PackageService;
pub use photos::PhotoService;
pub use reconcile::{ReconcileOptions, ReconcileService};
pub use upload::UploadService;

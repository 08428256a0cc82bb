pub mod backup;
pub mod dataset;
pub mod session;
pub mod site_config;
pub mod user;
pub mod video;

pub use backup::{BackupBundle, LatestBackupPointer};
pub use dataset::Dataset;
pub use session::{NewSession, Session, SessionPatch};
pub use site_config::{SiteConfig, SiteConfigPatch, StorageCredentials};
pub use user::{NewUser, User, UserPatch};
pub use video::{NewVideo, Video, VideoDuration, VideoPatch};

/// Outbound mirroring of local assistant replies
pub mod scheduler;

pub use scheduler::{MirrorScheduler, MIRROR_KIND};

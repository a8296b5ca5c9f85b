//! Point-cloud side of the localization pipeline: fusing depth captures
//! into clouds, loading the pre-scanned reference cloud, and ICP alignment.

mod fuse;
mod icp;
mod ply;

pub use fuse::{fuse, fuse_in_body, FuseError};
pub use icp::{align, AlignError, IcpConfig};
pub use ply::{read_ply, write_ply, PlyError};

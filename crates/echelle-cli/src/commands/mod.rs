pub mod config;
pub mod info;
pub mod normalize;
pub mod run;
pub mod stitch;

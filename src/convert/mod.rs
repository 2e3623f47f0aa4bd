// Conversion domain: planar YUV capture to packed RGBA.

pub mod error;
pub mod packed;
pub mod yuv;

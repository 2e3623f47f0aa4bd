use tracing::debug;

use crate::convert::error::{ConvertError, Result};
use crate::convert::packed::{PackedFrame, BYTES_PER_PIXEL};
use crate::source::types::{Dimensions, Plane, RawFrame, PLANE_COUNT};

/// Converts planar 4:2:0 camera frames to packed RGBA.
///
/// Each frame is first compacted into a YV12 scratch buffer (luma, then the
/// V plane, then the U plane), then transformed into the retained output
/// frame. Both buffers are allocated once per frame size and overwritten on
/// every call after that.
pub struct ColorSpaceConverter {
    dims: Option<Dimensions>,
    yv12: Vec<u8>,
    output: PackedFrame,
    allocations: u64,
}

impl ColorSpaceConverter {
    pub fn new() -> Self {
        Self {
            dims: None,
            yv12: Vec::new(),
            output: PackedFrame::new(Dimensions::new(0, 0)),
            allocations: 0,
        }
    }

    /// Convert `frame` into the retained output buffer and return it.
    ///
    /// The frame is only read; releasing it stays with the caller.
    pub fn convert(&mut self, frame: &RawFrame) -> Result<&PackedFrame> {
        let dims = frame.dims();
        validate(dims, frame.planes())?;
        self.ensure_scratch(dims);

        let luma_len = dims.pixel_count();
        let chroma = dims.chroma();
        let chroma_len = chroma.pixel_count();
        let planes = frame.planes();

        let (luma, rest) = self.yv12.split_at_mut(luma_len);
        let (v, u) = rest.split_at_mut(chroma_len);
        compact(&planes[0], dims, luma);
        // YV12 wants V before U; capture order is U then V
        compact(&planes[2], chroma, v);
        compact(&planes[1], chroma, u);

        yv12_to_rgba(&self.yv12, dims, self.output.data_mut());
        Ok(&self.output)
    }

    /// The most recent conversion result.
    pub fn output(&self) -> &PackedFrame {
        &self.output
    }

    /// How many times the scratch pair has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    fn ensure_scratch(&mut self, dims: Dimensions) {
        if self.dims == Some(dims) {
            return;
        }
        let chroma = dims.chroma().pixel_count();
        self.yv12 = vec![0; dims.pixel_count() + 2 * chroma];
        self.output.ensure(dims);
        self.allocations += 1;
        if let Some(previous) = self.dims.replace(dims) {
            debug!("frame size changed from {previous} to {dims}, reallocated scratch buffers");
        }
    }
}

impl Default for ColorSpaceConverter {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(dims: Dimensions, planes: &[Plane; PLANE_COUNT]) -> Result<()> {
    if dims.is_empty() {
        return Err(ConvertError::Empty(dims));
    }
    let chroma = dims.chroma();
    for (index, plane) in planes.iter().enumerate() {
        let size = if index == 0 { dims } else { chroma };
        let (width, height) = (size.width as usize, size.height as usize);
        let row_span = (width - 1) * plane.pixel_stride() + 1;
        if plane.row_stride() < row_span {
            return Err(ConvertError::StrideTooSmall {
                plane: index,
                stride: plane.row_stride(),
                width,
            });
        }
        let required = plane.required_len(width, height);
        if plane.size() < required {
            return Err(ConvertError::PlaneTooSmall {
                plane: index,
                required,
                actual: plane.size(),
            });
        }
    }
    Ok(())
}

/// Copy a possibly strided plane into a tightly packed destination.
fn compact(plane: &Plane, size: Dimensions, dst: &mut [u8]) {
    let width = size.width as usize;
    let src = plane.data();
    let stride = plane.row_stride();
    let step = plane.pixel_stride();

    if step == 1 && stride == width {
        dst.copy_from_slice(&src[..dst.len()]);
        return;
    }
    for (row, line) in dst.chunks_exact_mut(width).enumerate() {
        let start = row * stride;
        if step == 1 {
            line.copy_from_slice(&src[start..start + width]);
        } else {
            for (x, sample) in line.iter_mut().enumerate() {
                *sample = src[start + x * step];
            }
        }
    }
}

/// Full-range BT.601 YV12 to RGBA, 8-bit fixed point. Alpha is opaque.
///
/// `yv12` holds the luma plane followed by the V and U planes, each at
/// `ceil(w/2) x ceil(h/2)`. `rgba` must be `w * h * 4` bytes.
pub fn yv12_to_rgba(yv12: &[u8], dims: Dimensions, rgba: &mut [u8]) {
    let width = dims.width as usize;
    let chroma = dims.chroma();
    let chroma_width = chroma.width as usize;
    let luma_len = dims.pixel_count();
    let chroma_len = chroma.pixel_count();

    let y_plane = &yv12[..luma_len];
    let v_plane = &yv12[luma_len..luma_len + chroma_len];
    let u_plane = &yv12[luma_len + chroma_len..luma_len + 2 * chroma_len];

    for (row, out_row) in rgba.chunks_exact_mut(width * BYTES_PER_PIXEL).enumerate() {
        let luma_row = &y_plane[row * width..(row + 1) * width];
        let chroma_row = (row / 2) * chroma_width;
        for (col, px) in out_row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let y = luma_row[col] as i32;
            let u = u_plane[chroma_row + col / 2] as i32 - 128;
            let v = v_plane[chroma_row + col / 2] as i32 - 128;

            px[0] = ((y * 256 + 359 * v) >> 8).clamp(0, 255) as u8;
            px[1] = ((y * 256 - 88 * u - 183 * v) >> 8).clamp(0, 255) as u8;
            px[2] = ((y * 256 + 454 * u) >> 8).clamp(0, 255) as u8;
            px[3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, y: u8, u: u8, v: u8) -> RawFrame {
        let dims = Dimensions::new(width, height);
        let chroma = dims.chroma();
        let cw = chroma.width as usize;
        let planes = [
            Plane::packed(vec![y; dims.pixel_count()], width as usize),
            Plane::packed(vec![u; chroma.pixel_count()], cw),
            Plane::packed(vec![v; chroma.pixel_count()], cw),
        ];
        RawFrame::detached(dims, planes, 0)
    }

    #[test]
    fn output_is_exactly_four_bytes_per_pixel() {
        let mut converter = ColorSpaceConverter::new();
        for (w, h) in [(2, 2), (16, 8), (640, 480), (3, 7), (1, 1)] {
            let frame = solid_frame(w, h, 100, 128, 128);
            let out = converter.convert(&frame).unwrap();
            assert_eq!(out.data().len(), (w * h * 4) as usize);
        }
    }

    #[test]
    fn neutral_chroma_yields_grey() {
        let mut converter = ColorSpaceConverter::new();
        let out = converter.convert(&solid_frame(4, 2, 128, 128, 128)).unwrap();
        for px in out.data().chunks(4) {
            assert_eq!(px, [128, 128, 128, 255]);
        }
    }

    #[test]
    fn chroma_planes_are_read_as_u_then_v() {
        // U saturated, V empty: blue-green. Reading the planes the other
        // way round would give (255, 81, 0).
        let mut converter = ColorSpaceConverter::new();
        let out = converter.convert(&solid_frame(2, 2, 128, 255, 0)).unwrap();
        assert_eq!(out.view().pixel(0, 0), Some([0, 175, 255, 255]));
        assert_eq!(out.view().pixel(1, 1), Some([0, 175, 255, 255]));
    }

    #[test]
    fn yv12_scratch_holds_v_before_u() {
        let mut converter = ColorSpaceConverter::new();
        converter.convert(&solid_frame(2, 2, 1, 2, 3)).unwrap();
        assert_eq!(converter.yv12, vec![1, 1, 1, 1, 3, 2]);
    }

    #[test]
    fn same_size_frames_do_not_reallocate() {
        let mut converter = ColorSpaceConverter::new();
        converter.convert(&solid_frame(8, 8, 10, 128, 128)).unwrap();
        let scratch = converter.yv12.as_ptr();
        let output = converter.output().data().as_ptr();

        for luma in 0..5 {
            converter
                .convert(&solid_frame(8, 8, luma, 128, 128))
                .unwrap();
        }
        assert_eq!(converter.allocations(), 1);
        assert_eq!(converter.yv12.as_ptr(), scratch);
        assert_eq!(converter.output().data().as_ptr(), output);
    }

    #[test]
    fn size_change_reallocates_both_buffers() {
        let mut converter = ColorSpaceConverter::new();
        converter.convert(&solid_frame(4, 4, 0, 128, 128)).unwrap();
        converter.convert(&solid_frame(6, 2, 0, 128, 128)).unwrap();
        assert_eq!(converter.allocations(), 2);
        assert_eq!(converter.output().dims(), Dimensions::new(6, 2));
        assert_eq!(converter.yv12.len(), 12 + 3 + 3);
    }

    #[test]
    fn strided_planes_match_packed_planes() {
        let dims = Dimensions::new(4, 2);
        let luma: Vec<u8> = (0..8).map(|i| 40 + i * 20).collect();

        let packed = RawFrame::detached(
            dims,
            [
                Plane::packed(luma.clone(), 4),
                Plane::packed(vec![90, 200], 2),
                Plane::packed(vec![60, 170], 2),
            ],
            0,
        );

        // rows padded to 7 bytes; chroma interleaved with a pixel stride of 2
        let mut padded_luma = vec![0u8; 7 * 2];
        padded_luma[..4].copy_from_slice(&luma[..4]);
        padded_luma[7..11].copy_from_slice(&luma[4..]);
        let strided = RawFrame::detached(
            dims,
            [
                Plane::new(padded_luma, 7, 1),
                Plane::new(vec![90, 0, 200], 4, 2),
                Plane::new(vec![60, 0, 170], 4, 2),
            ],
            1,
        );

        let mut a = ColorSpaceConverter::new();
        let mut b = ColorSpaceConverter::new();
        let expected = a.convert(&packed).unwrap().clone();
        assert_eq!(b.convert(&strided).unwrap(), &expected);
    }

    #[test]
    fn odd_dimensions_use_rounded_up_chroma() {
        let mut converter = ColorSpaceConverter::new();
        let frame = solid_frame(3, 3, 200, 128, 128);
        assert_eq!(frame.planes()[1].size(), 4);
        let out = converter.convert(&frame).unwrap();
        assert_eq!(out.view().pixel(2, 2), Some([200, 200, 200, 255]));
    }

    #[test]
    fn undersized_plane_is_rejected() {
        let dims = Dimensions::new(4, 4);
        let frame = RawFrame::detached(
            dims,
            [
                Plane::packed(vec![0; 16], 4),
                Plane::packed(vec![128; 3], 2),
                Plane::packed(vec![128; 4], 2),
            ],
            0,
        );
        let err = ColorSpaceConverter::new().convert(&frame).unwrap_err();
        assert_eq!(
            err,
            ConvertError::PlaneTooSmall {
                plane: 1,
                required: 4,
                actual: 3,
            }
        );
    }

    #[test]
    fn narrow_stride_is_rejected() {
        let dims = Dimensions::new(4, 2);
        let frame = RawFrame::detached(
            dims,
            [
                Plane::new(vec![0; 16], 3, 1),
                Plane::packed(vec![128; 2], 2),
                Plane::packed(vec![128; 2], 2),
            ],
            0,
        );
        assert!(matches!(
            ColorSpaceConverter::new().convert(&frame),
            Err(ConvertError::StrideTooSmall { plane: 0, .. })
        ));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let frame = RawFrame::detached(Dimensions::new(0, 4), Default::default(), 0);
        assert!(matches!(
            ColorSpaceConverter::new().convert(&frame),
            Err(ConvertError::Empty(_))
        ));
    }
}

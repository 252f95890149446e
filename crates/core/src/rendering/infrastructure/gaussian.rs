/// Pixel rectangle inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl RoiRect {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Kernels needed to blur at one radius.
///
/// Large kernels are applied to a downscaled copy with a proportionally
/// smaller kernel, then upscaled; the result is visually equivalent and
/// an order of magnitude cheaper.
#[derive(Clone, Debug)]
pub struct BlurKernel {
    full: Vec<f32>,
    small: Vec<f32>,
    scale: usize,
}

impl BlurKernel {
    /// Kernel of size `2 * radius + 1`.
    pub fn for_radius(radius: u32) -> Self {
        let size = 2 * radius as usize + 1;
        let scale = (size / 50).max(1);
        let small_size = (size / scale) | 1;
        Self {
            full: kernel_1d(size),
            small: kernel_1d(small_size),
            scale,
        }
    }

    pub fn size(&self) -> usize {
        self.full.len()
    }

    pub fn apply(&self, roi: &mut [u8], w: usize, h: usize, channels: usize, temp: &mut Vec<f32>) {
        if self.scale <= 1 || w < self.scale * 2 || h < self.scale * 2 {
            separable_blur(roi, w, h, channels, &self.full, temp);
            return;
        }
        let (mut small, sw, sh) = downscale(roi, w, h, channels, self.scale);
        separable_blur(&mut small, sw, sh, channels, &self.small, temp);
        let restored = upscale(&small, sw, sh, channels, w, h);
        roi[..w * h * channels].copy_from_slice(&restored);
    }
}

/// Normalised 1D Gaussian; sigma = size / 6 so the kernel spans ±3 sigma.
pub fn kernel_1d(size: usize) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = size as f64 / 6.0;
    let half = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Horizontal then vertical pass with edge clamping. `temp` is reused
/// across calls.
pub fn separable_blur(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    temp: &mut Vec<f32>,
) {
    if kernel.len() <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = (kernel.len() / 2) as isize;
    temp.clear();
    temp.resize(width * height * channels, 0.0);

    let clamp_x = |x: isize| x.clamp(0, width as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, height as isize - 1) as usize;

    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (k, &weight) in kernel.iter().enumerate() {
                    let sx = clamp_x(x as isize + k as isize - half);
                    acc += data[(row + sx) * channels + c] as f32 * weight;
                }
                temp[(row + x) * channels + c] = acc;
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (k, &weight) in kernel.iter().enumerate() {
                    let sy = clamp_y(y as isize + k as isize - half);
                    acc += temp[(sy * width + x) * channels + c] * weight;
                }
                data[(y * width + x) * channels + c] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Copies `rect` out of a frame buffer into `roi`.
pub fn extract_roi(data: &[u8], frame_width: usize, channels: usize, rect: RoiRect, roi: &mut Vec<u8>) {
    let row_len = rect.w * channels;
    roi.clear();
    roi.reserve(row_len * rect.h);
    for row in rect.y..rect.y + rect.h {
        let start = (row * frame_width + rect.x) * channels;
        roi.extend_from_slice(&data[start..start + row_len]);
    }
}

/// Area-average downscale by an integer factor.
pub fn downscale(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    factor: usize,
) -> (Vec<u8>, usize, usize) {
    let out_w = width / factor;
    let out_h = height / factor;
    let mut out = vec![0u8; out_w * out_h * channels];
    let count = (factor * factor) as u32;

    for y in 0..out_h {
        for x in 0..out_w {
            for c in 0..channels {
                let mut sum = 0u32;
                for dy in 0..factor {
                    let row = (y * factor + dy) * width;
                    for dx in 0..factor {
                        sum += data[(row + x * factor + dx) * channels + c] as u32;
                    }
                }
                out[(y * out_w + x) * channels + c] = (sum / count) as u8;
            }
        }
    }
    (out, out_w, out_h)
}

/// Bilinear upscale to an arbitrary target size.
pub fn upscale(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    target_w: usize,
    target_h: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; target_w * target_h * channels];
    if width == 0 || height == 0 {
        return out;
    }
    let sx_ratio = (width as f32 - 1.0) / (target_w as f32 - 1.0).max(1.0);
    let sy_ratio = (height as f32 - 1.0) / (target_h as f32 - 1.0).max(1.0);

    for y in 0..target_h {
        let fy_src = y as f32 * sy_ratio;
        let y0 = (fy_src.floor() as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = fy_src - y0 as f32;
        for x in 0..target_w {
            let fx_src = x as f32 * sx_ratio;
            let x0 = (fx_src.floor() as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = fx_src - x0 as f32;
            for c in 0..channels {
                let p = |xx: usize, yy: usize| data[(yy * width + xx) * channels + c] as f32;
                let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
                let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                out[(y * target_w + x) * channels + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

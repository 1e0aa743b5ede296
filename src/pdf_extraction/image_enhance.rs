// Pre-OCR image enhancement
use image::DynamicImage;

use crate::config::EnhanceConfig;

/// Grayscale, contrast boost, sharpening, then unsharp masking.
pub fn enhance(image: &DynamicImage, config: &EnhanceConfig) -> DynamicImage {
    let gray = image.grayscale();
    let contrasted = gray.adjust_contrast(contrast_percent(config.contrast));
    let sharpened = contrasted.filter3x3(&sharpen_kernel(config.sharpness));
    sharpened.unsharpen(config.unsharp_sigma, config.unsharp_threshold)
}

/// Map a multiplicative contrast factor onto the percentage that
/// `adjust_contrast` expects, which scales by ((100 + c) / 100)^2.
pub fn contrast_percent(factor: f32) -> f32 {
    (factor.max(0.0).sqrt() - 1.0) * 100.0
}

/// Blend between a smoothing kernel (factor 0) and identity (factor 1);
/// factors above 1 extrapolate into sharpening.
pub fn sharpen_kernel(factor: f32) -> [f32; 9] {
    let smooth = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0].map(|v: f32| v / 13.0);
    let mut kernel = [0.0f32; 9];
    for (i, k) in kernel.iter_mut().enumerate() {
        let identity = if i == 4 { 1.0 } else { 0.0 };
        *k = factor * identity + (1.0 - factor) * smooth[i];
    }
    kernel
}

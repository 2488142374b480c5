//! Page-image preprocessing for the OCR path.
//!
//! Scanned disclosure pages arrive with noise, skew, and black scan
//! borders. The pipeline is: grayscale, contrast normalization, median
//! denoise, Otsu binarization, deskew, border crop. Every step is a pure
//! function over `GrayImage` buffers.

use image::{DynamicImage, GrayImage, Luma};

/// Degrees beyond which a detected skew is corrected.
const DESKEW_MIN_ANGLE: f32 = 0.3;
/// Search range for skew estimation, in degrees.
const DESKEW_MAX_ANGLE: f32 = 5.0;
const DESKEW_STEP: f32 = 0.5;

/// Run the full preprocessing pipeline.
pub fn preprocess(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let normalized = normalize_contrast(&gray);
    let denoised = median_denoise(&normalized);
    let threshold = otsu_threshold(&denoised);
    let binary = binarize(&denoised, threshold);

    let angle = estimate_skew(&binary);
    let deskewed = if angle.abs() >= DESKEW_MIN_ANGLE {
        rotate(&binary, -angle)
    } else {
        binary
    };

    crop_borders(&deskewed)
}

/// Linear contrast stretch between the 2nd and 98th intensity percentiles.
pub fn normalize_contrast(image: &GrayImage) -> GrayImage {
    let histogram = intensity_histogram(image);
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return image.clone();
    }

    let low = percentile(&histogram, total, 0.02);
    let high = percentile(&histogram, total, 0.98);
    if high <= low {
        return image.clone();
    }

    let scale = 255.0 / (high - low) as f32;
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y)[0];
        let stretched = ((value.saturating_sub(low)) as f32 * scale).min(255.0);
        Luma([stretched as u8])
    })
}

/// 3x3 median filter; edges are passed through unchanged.
pub fn median_denoise(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return image.clone();
    }

    GrayImage::from_fn(width, height, |x, y| {
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            return *image.get_pixel(x, y);
        }
        let mut window = [0u8; 9];
        let mut idx = 0;
        for dy in 0..3 {
            for dx in 0..3 {
                window[idx] = image.get_pixel(x + dx - 1, y + dy - 1)[0];
                idx += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}

/// Otsu's method: the threshold maximizing between-class variance.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let histogram = intensity_histogram(image);
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 128;
    }

    let weighted_sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(value, count)| value as u64 * count)
        .sum();

    let mut best_threshold = 128u8;
    let mut best_variance = 0.0f64;
    let mut background_count = 0u64;
    let mut background_sum = 0u64;

    for threshold in 0..256usize {
        background_count += histogram[threshold];
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }
        background_sum += threshold as u64 * histogram[threshold];

        let mean_bg = background_sum as f64 / background_count as f64;
        let mean_fg = (weighted_sum - background_sum) as f64 / foreground_count as f64;
        let variance = background_count as f64
            * foreground_count as f64
            * (mean_bg - mean_fg)
            * (mean_bg - mean_fg);

        if variance > best_variance {
            best_variance = variance;
            best_threshold = threshold as u8;
        }
    }
    best_threshold
}

/// Threshold to pure black/white.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] <= threshold {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Estimate page skew in degrees via projection profiles.
///
/// Dark pixels are projected onto row bins under each candidate rotation;
/// the angle whose profile has the highest variance aligns text lines with
/// the horizontal axis.
pub fn estimate_skew(binary: &GrayImage) -> f32 {
    let dark: Vec<(f32, f32)> = binary
        .enumerate_pixels()
        .filter(|(_, _, pixel)| pixel[0] == 0)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect();
    if dark.len() < 100 {
        return 0.0;
    }

    let height = binary.height() as usize + binary.width() as usize;
    let mut best_angle = 0.0f32;
    let mut best_variance = f64::MIN;

    let steps = (2.0 * DESKEW_MAX_ANGLE / DESKEW_STEP) as i32;
    for step in 0..=steps {
        let angle = -DESKEW_MAX_ANGLE + step as f32 * DESKEW_STEP;
        let radians = angle.to_radians();
        let (sin, cos) = radians.sin_cos();

        let mut bins = vec![0u32; 2 * height];
        for &(x, y) in &dark {
            let projected = y * cos - x * sin;
            let bin = (projected as i64 + height as i64) as usize;
            if bin < bins.len() {
                bins[bin] += 1;
            }
        }

        let variance = profile_variance(&bins);
        if variance > best_variance {
            best_variance = variance;
            best_angle = angle;
        }
    }
    best_angle
}

/// Rotate about the image center, nearest neighbor, white background.
pub fn rotate(image: &GrayImage, degrees: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();

    GrayImage::from_fn(width, height, |x, y| {
        // Inverse mapping: where did this output pixel come from?
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let src_x = cx + dx * cos + dy * sin;
        let src_y = cy - dx * sin + dy * cos;
        if src_x < 0.0 || src_y < 0.0 {
            return Luma([255]);
        }
        let (sx, sy) = (src_x as u32, src_y as u32);
        if sx < width && sy < height {
            *image.get_pixel(sx, sy)
        } else {
            Luma([255])
        }
    })
}

/// Trim solid scan borders, then crop to the content's bounding box with a
/// small margin.
pub fn crop_borders(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    if width < 8 || height < 8 {
        return image.clone();
    }

    // Solid black edge rows/columns are scanner artifacts
    let mut top = 0;
    while top < height / 4 && row_dark_fraction(image, top) > 0.9 {
        top += 1;
    }
    let mut bottom = height - 1;
    while bottom > height * 3 / 4 && row_dark_fraction(image, bottom) > 0.9 {
        bottom -= 1;
    }
    let mut left = 0;
    while left < width / 4 && col_dark_fraction(image, left) > 0.9 {
        left += 1;
    }
    let mut right = width - 1;
    while right > width * 3 / 4 && col_dark_fraction(image, right) > 0.9 {
        right -= 1;
    }

    // Shrink to the content bounding box inside the remaining area
    let margin = 8u32;
    let mut min_x = right;
    let mut max_x = left;
    let mut min_y = bottom;
    let mut max_y = top;
    let mut found = false;
    for y in top..=bottom {
        for x in left..=right {
            if image.get_pixel(x, y)[0] == 0 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                found = true;
            }
        }
    }
    if !found {
        return image.clone();
    }

    let min_x = min_x.saturating_sub(margin);
    let min_y = min_y.saturating_sub(margin);
    let max_x = (max_x + margin).min(width - 1);
    let max_y = (max_y + margin).min(height - 1);

    image::imageops::crop_imm(image, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
        .to_image()
}

fn intensity_histogram(image: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    histogram
}

fn percentile(histogram: &[u64; 256], total: u64, fraction: f64) -> u8 {
    let target = (total as f64 * fraction) as u64;
    let mut cumulative = 0u64;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return value as u8;
        }
    }
    255
}

fn profile_variance(bins: &[u32]) -> f64 {
    let n = bins.len() as f64;
    let mean = bins.iter().map(|&b| b as f64).sum::<f64>() / n;
    bins.iter()
        .map(|&b| {
            let d = b as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

fn row_dark_fraction(image: &GrayImage, y: u32) -> f64 {
    let dark = (0..image.width())
        .filter(|&x| image.get_pixel(x, y)[0] == 0)
        .count();
    dark as f64 / image.width() as f64
}

fn col_dark_fraction(image: &GrayImage, x: u32) -> f64 {
    let dark = (0..image.height())
        .filter(|&y| image.get_pixel(x, y)[0] == 0)
        .count();
    dark as f64 / image.height() as f64
}

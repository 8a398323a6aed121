// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Stamp extraction: turn a detected footprint population into the clean,
//! mask-free candidate stamp pairs the solver operates on.

use crate::config::{Config, DetThresholdType};
use crate::error::{Error, Result};
use crate::image::{
    Detector, Footprint, ImageDataType, MaskedImage, MASK_BIT_STAMP_CANDIDATE, MASK_BIT_STAMP_USED,
};
use crate::util::vec_helpers::mean_stddev;

/// One extracted candidate stamp pair, ready to become a
/// [`crate::candidate::KernelCandidate`].
pub struct ExtractedStamp {
    pub footprint: Footprint,
    pub template: MaskedImage,
    pub science: MaskedImage,
}

/// Run `detector` against the template at a decreasing sequence of
/// thresholds (starting at `config.det_threshold`, scaled by
/// `det_threshold_scaling` down to `det_threshold_min`) until at least
/// `config.min_clean_fp` footprints survive growth, mask-rejection, and
/// edge-rejection.
///
/// Marks `MASK_BIT_STAMP_CANDIDATE` over every grown footprint considered
/// (on both images, across every threshold retry this run makes) and
/// `MASK_BIT_STAMP_USED` over the footprints that end up in the returned
/// stamps; both bits are cleared on entry.
pub fn extract_stamps(
    template: &mut MaskedImage,
    science: &mut MaskedImage,
    detector: &dyn Detector,
    config: &Config,
) -> Result<Vec<ExtractedStamp>> {
    let bounds = template.size();
    let grow_by = (config.fp_grow_ksize * config.kernel_cols.max(config.kernel_rows) as f64)
        .round() as usize;

    template.clear_mask_bit(MASK_BIT_STAMP_CANDIDATE);
    template.clear_mask_bit(MASK_BIT_STAMP_USED);
    science.clear_mask_bit(MASK_BIT_STAMP_CANDIDATE);
    science.clear_mask_bit(MASK_BIT_STAMP_USED);

    let (bg_mean, bg_stddev) = mean_stddev(template.intensity.data().iter().map(|v| v.to_f64()));
    let mean_variance: f64 = {
        let data = template.variance.data();
        data.iter().map(|v| v.to_f64()).sum::<f64>() / data.len().max(1) as f64
    };

    let mut threshold = config.det_threshold;
    let mut last_threshold = threshold;
    loop {
        let pixel_threshold = match config.det_threshold_type {
            DetThresholdType::Value => threshold,
            DetThresholdType::Stdev => bg_mean + threshold * bg_stddev,
            DetThresholdType::Variance => threshold * mean_variance.max(0.0).sqrt(),
        };
        let raw = detector.detect(&template.intensity, pixel_threshold)?;

        let mut stamps = Vec::new();
        for fp in raw {
            if fp.npix < config.fp_npix_min || fp.npix > config.fp_npix_max {
                continue;
            }
            let Some(grown) = fp.grown(grow_by, bounds) else {
                continue;
            };
            let origin = (grown.x0, grown.y0);
            let size = (grown.cols, grown.rows);
            template.set_mask_bit_in(origin, size, MASK_BIT_STAMP_CANDIDATE);
            science.set_mask_bit_in(origin, size, MASK_BIT_STAMP_CANDIDATE);

            if template.has_bad_pixel_in(origin, size) || science.has_bad_pixel_in(origin, size) {
                continue;
            }
            let t_stamp = sub_masked_image(template, grown)?;
            let s_stamp = sub_masked_image(science, grown)?;
            template.set_mask_bit_in(origin, size, MASK_BIT_STAMP_USED);
            science.set_mask_bit_in(origin, size, MASK_BIT_STAMP_USED);
            stamps.push(ExtractedStamp {
                footprint: grown,
                template: t_stamp,
                science: s_stamp,
            });
        }

        if stamps.len() >= config.min_clean_fp {
            return Ok(stamps);
        }

        last_threshold = threshold;
        let next = threshold * config.det_threshold_scaling;
        if next < config.det_threshold_min || next >= threshold {
            return Err(Error::NoCandidates(last_threshold));
        }
        threshold = next;
    }
}

fn sub_masked_image(image: &MaskedImage, fp: Footprint) -> Result<MaskedImage> {
    let origin = (fp.x0, fp.y0);
    let size = (fp.cols, fp.rows);
    Ok(MaskedImage {
        intensity: image.intensity.as_rect().rect(origin, size)?.to_image()?,
        variance: image.variance.as_rect().rect(origin, size)?.to_image()?,
        mask: image.mask.as_rect().rect(origin, size)?.to_image()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ThresholdDetector;

    fn blob_images(cols: usize, rows: usize) -> (MaskedImage, MaskedImage) {
        let mut template = MaskedImage::new(cols, rows).unwrap();
        for y in 20..30 {
            for x in 20..30 {
                template.intensity.set(x, y, 50.0);
            }
        }
        let science = template.clone();
        (template, science)
    }

    #[test]
    fn extracts_at_least_min_clean_fp_or_errors() {
        let (mut template, mut science) = blob_images(64, 64);
        let detector = ThresholdDetector;
        let config = Config {
            min_clean_fp: 1,
            fp_npix_min: 1,
            kernel_cols: 3,
            kernel_rows: 3,
            ..Config::default()
        };
        let stamps = extract_stamps(&mut template, &mut science, &detector, &config).unwrap();
        assert_eq!(stamps.len(), 1);
    }

    #[test]
    fn footprint_touching_bad_mask_is_rejected() {
        let (mut template, mut science) = blob_images(64, 64);
        template.mask.set(25, 25, crate::image::MASK_BIT_BAD);
        let detector = ThresholdDetector;
        let config = Config {
            min_clean_fp: 1,
            fp_npix_min: 1,
            kernel_cols: 3,
            kernel_rows: 3,
            det_threshold_min: 9.0,
            ..Config::default()
        };
        assert!(extract_stamps(&mut template, &mut science, &detector, &config).is_err());
    }

    #[test]
    fn no_sources_above_threshold_errors() {
        let mut template = MaskedImage::new(32, 32).unwrap();
        let mut science = MaskedImage::new(32, 32).unwrap();
        let detector = ThresholdDetector;
        let config = Config::default();
        assert!(extract_stamps(&mut template, &mut science, &detector, &config).is_err());
    }

    #[test]
    fn stdev_threshold_type_scales_with_background_noise() {
        let (mut template, mut science) = blob_images(64, 64);
        let detector = ThresholdDetector;
        // The blob sits at 50 counts above a flat zero background, so a
        // handful of sigma above the (near-zero) background stddev should
        // still pick it out as readily as an absolute-value threshold.
        let config = Config {
            min_clean_fp: 1,
            fp_npix_min: 1,
            kernel_cols: 3,
            kernel_rows: 3,
            det_threshold_type: DetThresholdType::Stdev,
            det_threshold: 5.0,
            ..Config::default()
        };
        let stamps = extract_stamps(&mut template, &mut science, &detector, &config).unwrap();
        assert_eq!(stamps.len(), 1);
    }

    #[test]
    fn used_and_candidate_mask_bits_are_set_on_extraction() {
        let (mut template, mut science) = blob_images(64, 64);
        let detector = ThresholdDetector;
        let config = Config {
            min_clean_fp: 1,
            fp_npix_min: 1,
            kernel_cols: 3,
            kernel_rows: 3,
            ..Config::default()
        };
        let stamps = extract_stamps(&mut template, &mut science, &detector, &config).unwrap();
        let fp = stamps[0].footprint;
        assert_eq!(
            template.mask.get(fp.x0, fp.y0) & crate::image::MASK_BIT_STAMP_CANDIDATE,
            crate::image::MASK_BIT_STAMP_CANDIDATE
        );
        assert_eq!(
            template.mask.get(fp.x0, fp.y0) & crate::image::MASK_BIT_STAMP_USED,
            crate::image::MASK_BIT_STAMP_USED
        );
        assert_eq!(
            science.mask.get(fp.x0, fp.y0) & crate::image::MASK_BIT_STAMP_USED,
            crate::image::MASK_BIT_STAMP_USED
        );
        // A pixel far outside any footprint was never touched.
        assert_eq!(template.mask.get(0, 0), 0);
    }
}

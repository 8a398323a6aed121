// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io::Write;

use color_eyre::eyre::Result;
use diffim::image::Image;

use super::pnm::data_range;

/// Writes `image` as a 16-bit grayscale PNG, linearly rescaled from its own
/// min/max to the full `u16` range.
pub fn write_png<Writer: Write>(image: &Image<f64>, writer: &mut Writer) -> Result<()> {
    let (cols, rows) = image.size();
    let (lo, hi) = data_range(image);
    let scale = 65535.0 / (hi - lo);

    let mut encoder = png::Encoder::new(writer, cols as u32, rows as u32);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Sixteen);
    let mut png_writer = encoder.write_header()?;

    let mut data = vec![0u8; cols * rows * 2];
    for (pixel, chunk) in image.data().iter().zip(data.chunks_exact_mut(2)) {
        let v = (((*pixel - lo) * scale).clamp(0.0, 65535.0) + 0.5) as u16;
        chunk.copy_from_slice(&v.to_be_bytes());
    }
    png_writer.write_image_data(&data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_valid_png_signature() {
        let mut image = Image::<f64>::new(4, 4).unwrap();
        for (i, v) in image.data_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        let mut buf = Vec::new();
        write_png(&image, &mut buf).unwrap();
        assert_eq!(&buf[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }
}

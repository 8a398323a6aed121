// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io::Write;

use color_eyre::eyre::Result;
use diffim::image::Image;

fn numpy_header<Writer: Write>(cols: usize, rows: usize, writer: &mut Writer) -> Result<()> {
    // The magic string and version for .npy files (Version 1.0).
    let magic_string: [u8; 8] = [0x93, b'N', b'U', b'M', b'P', b'Y', 0x01, 0x00];

    // `<f8` is little-endian 64-bit float, matching this crate's internal
    // `Image<f64>` representation exactly.
    let mut header_dict_str = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    // Pad with spaces so magic + length-prefix + header is a multiple of 16,
    // per the .npy format spec, then terminate with a newline.
    let pad = (16 - ((magic_string.len() + 2 + header_dict_str.len() + 1) % 16)) % 16;
    header_dict_str.push_str(&" ".repeat(pad));
    header_dict_str.push('\n');

    let header_len = header_dict_str.len();
    assert!(header_len <= u16::MAX as usize);
    writer.write_all(&magic_string)?;
    writer.write_all(&(header_len as u16).to_le_bytes())?;
    writer.write_all(header_dict_str.as_bytes())?;
    Ok(())
}

/// Writes `image` as a `.npy` array of shape `(rows, cols)`, dtype `<f8`.
pub fn write_npy<Writer: Write>(image: &Image<f64>, writer: &mut Writer) -> Result<()> {
    let (cols, rows) = image.size();
    numpy_header(cols, rows, writer)?;
    for &v in image.data() {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_declares_shape_and_dtype() {
        let image = Image::<f64>::filled(5, 2, 1.0).unwrap();
        let mut buf = Vec::new();
        write_npy(&image, &mut buf).unwrap();
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        let header = String::from_utf8_lossy(&buf[10..10 + header_len]);
        assert!(header.contains("'descr': '<f8'"));
        assert!(header.contains("(2, 5)"));
        assert_eq!(buf.len() - (10 + header_len), 5 * 2 * 8);
    }
}

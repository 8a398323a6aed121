// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Loads a template/science image pair from disk. The pipeline itself is
//! agnostic to image format; this module only needs to produce a
//! [`MaskedImage`] (intensity plane plus a uniform variance plane and a
//! clear mask), so a minimal binary-PGM (P5) reader is all a CLI driver
//! needs -- a real deployment would plug in its own loader (FITS, etc.)
//! here instead.

use std::io::Read;
use std::path::Path;

use color_eyre::eyre::{eyre, Result, WrapErr};
use diffim::image::{Image, MaskedImage};

/// Skips PGM/PNM whitespace and `#`-prefixed comments, then reads one
/// whitespace-delimited ASCII token.
fn next_token(bytes: &[u8], pos: &mut usize) -> Result<String> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    if start == *pos {
        return Err(eyre!("unexpected end of PGM header"));
    }
    Ok(String::from_utf8_lossy(&bytes[start..*pos]).into_owned())
}

/// Reads a binary-PGM (`P5`) file into a [`MaskedImage`] with a flat,
/// constant variance plane and an empty mask -- a loader that needs real
/// per-pixel variance and mask data should build the `MaskedImage` directly
/// instead of going through this helper.
pub fn read_pgm(path: &Path) -> Result<MaskedImage> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .wrap_err_with(|| format!("failed to open {:?}", path))?
        .read_to_end(&mut bytes)
        .wrap_err_with(|| format!("failed to read {:?}", path))?;

    let mut pos = 0usize;
    let magic = next_token(&bytes, &mut pos)?;
    if magic != "P5" {
        return Err(eyre!("{:?}: not a binary PGM (P5) file, got {:?}", path, magic));
    }
    let cols: usize = next_token(&bytes, &mut pos)?
        .parse()
        .wrap_err("invalid PGM width")?;
    let rows: usize = next_token(&bytes, &mut pos)?
        .parse()
        .wrap_err("invalid PGM height")?;
    let maxval: u32 = next_token(&bytes, &mut pos)?
        .parse()
        .wrap_err("invalid PGM maxval")?;
    // Exactly one whitespace byte separates the header from the raster.
    pos += 1;

    let mut image = Image::<f32>::new(cols, rows)?;
    if maxval <= 0xff {
        let n = cols * rows;
        if pos + n > bytes.len() {
            return Err(eyre!("{:?}: truncated PGM raster", path));
        }
        for (dst, &src) in image.data_mut().iter_mut().zip(&bytes[pos..pos + n]) {
            *dst = src as f32;
        }
    } else {
        let n = cols * rows;
        if pos + 2 * n > bytes.len() {
            return Err(eyre!("{:?}: truncated PGM raster", path));
        }
        for (dst, chunk) in image.data_mut().iter_mut().zip(bytes[pos..pos + 2 * n].chunks_exact(2)) {
            *dst = u16::from_be_bytes([chunk[0], chunk[1]]) as f32;
        }
    }

    Ok(MaskedImage {
        intensity: image,
        variance: Image::<f32>::filled(cols, rows, 1.0)?,
        mask: Image::<u32>::new(cols, rows)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn round_trips_8_bit_pgm() {
        let dir = std::env::temp_dir();
        let path = dir.join("diffim_cli_test_8bit.pgm");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"P5\n3 2\n255\n").unwrap();
            f.write_all(&[10, 20, 30, 40, 50, 60]).unwrap();
        }
        let img = read_pgm(&path).unwrap();
        assert_eq!(img.size(), (3, 2));
        assert_eq!(img.intensity.get(0, 0), 10.0);
        assert_eq!(img.intensity.get(2, 1), 60.0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_non_pgm_magic() {
        let dir = std::env::temp_dir();
        let path = dir.join("diffim_cli_test_bad_magic.pgm");
        std::fs::write(&path, b"P6\n1 1\n255\n\0\0\0").unwrap();
        assert!(read_pgm(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}

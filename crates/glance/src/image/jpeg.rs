use std::{
    env::{self, VarError},
    panic::catch_unwind,
    process,
};

use anyhow::bail;
use image::ImageBuffer;
use once_cell::sync::Lazy;

use super::Image;

/// Because computers, we support several different JPEG decoding backends.
#[derive(Debug)]
enum JpegBackend {
    /// Uses the `jpeg-decoder` crate (through `image`), a robust but slow pure-Rust JPEG decoder.
    JpegDecoder,
    /// Uses the `mozjpeg` crate, a wrapper around Mozilla's libjpeg fork. Robust and fast-ish, but
    /// C.
    MozJpeg,
    /// Uses the `zune-jpeg` crate, a pure-Rust JPEG decoder somewhat faster than `jpeg-decoder`.
    ZuneJpeg,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::MozJpeg;

const ENV_VAR_JPEG_BACKEND: &str = "GLANCE_JPEG_BACKEND";

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var(ENV_VAR_JPEG_BACKEND) {
        Ok(v) if v == "mozjpeg" => JpegBackend::MozJpeg,
        Ok(v) if v == "zune-jpeg" => JpegBackend::ZuneJpeg,
        Ok(v) if v == "jpeg-decoder" => JpegBackend::JpegDecoder,
        Ok(v) => {
            eprintln!("invalid value set for `{ENV_VAR_JPEG_BACKEND}` variable: '{v}'; exiting");
            process::exit(1);
        }
        Err(VarError::NotPresent) => DEFAULT_BACKEND,
        Err(VarError::NotUnicode(s)) => {
            eprintln!(
                "invalid value set for `{ENV_VAR_JPEG_BACKEND}` variable: {}; exiting",
                s.to_string_lossy()
            );
            process::exit(1);
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let buf = match *JPEG_BACKEND {
        JpegBackend::JpegDecoder => {
            image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8()
        }
        JpegBackend::MozJpeg => {
            // mozjpeg crate unfortunately reports errors only via unwinding
            let (buf, width, height) = catch_unwind(|| -> anyhow::Result<_> {
                let mut decompress = mozjpeg::Decompress::new_mem(data)?;

                // Tune settings for decode performance.
                decompress.do_fancy_upsampling(false);
                decompress.dct_method(mozjpeg::DctMethod::IntegerFast);

                let mut decompress = decompress.rgba()?;
                let buf = decompress
                    .read_scanlines_flat()
                    .ok_or_else(|| anyhow::anyhow!("failed to decode image"))?;
                Ok((buf, decompress.width(), decompress.height()))
            })
            .map_err(|payload| match payload.downcast::<String>() {
                Ok(string) => anyhow::Error::msg(string),
                Err(_) => anyhow::anyhow!("<unknown panic message>"),
            })??;

            match ImageBuffer::from_raw(u32::try_from(width)?, u32::try_from(height)?, buf) {
                Some(buf) => buf,
                None => bail!("mozjpeg returned a buffer that does not match {width}x{height}"),
            }
        }
        JpegBackend::ZuneJpeg => {
            use zune_jpeg::zune_core::colorspace::ColorSpace;
            use zune_jpeg::zune_core::options::DecoderOptions;

            let mut decomp = zune_jpeg::JpegDecoder::new_with_options(
                DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGBA),
                data,
            );
            decomp.decode_headers()?;
            let colorspace = decomp.get_output_colorspace();
            if colorspace != Some(ColorSpace::RGBA) {
                bail!("unsupported colorspace {colorspace:?} (expected RGBA)");
            }

            let Some(size) = decomp.output_buffer_size() else {
                bail!("zune-jpeg did not report an output buffer size");
            };
            let mut buf = vec![0; size];
            decomp.decode_into(&mut buf)?;
            let Some((width, height)) = decomp.dimensions() else {
                bail!("zune-jpeg did not report image dimensions");
            };
            match ImageBuffer::from_raw(width.into(), height.into(), buf) {
                Some(buf) => buf,
                None => bail!("zune-jpeg returned a buffer that does not match {width}x{height}"),
            }
        }
    };

    Ok(Image { buf })
}

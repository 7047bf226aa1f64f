use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

use crate::error::DecodeError;

/// Shorter delays are not rendered reliably, so every frame waits at least this long.
pub const MIN_FRAME_DURATION: Duration = Duration::from_millis(20);
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(100);

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Gif,
    /// Zip of frame images plus a JSON frame-timing manifest.
    Ugoira,
}

impl AnimationKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gif" => Some(AnimationKind::Gif),
            "zip" | "ugoira" => Some(AnimationKind::Ugoira),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub image: RgbaImage,
    pub duration: Duration,
}

/// Frames in display order. Never empty.
#[derive(Debug, Clone)]
pub struct DecodedAnimation {
    frames: Vec<AnimationFrame>,
}

impl DecodedAnimation {
    pub fn frames(&self) -> &[AnimationFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.frames.iter().map(|f| f.duration).collect()
    }

    pub fn duration_secs(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.duration.as_secs_f64()).collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.frames.iter().map(|f| f.duration).sum()
    }
}

#[derive(Debug, Deserialize)]
struct ManifestFrame {
    file: String,
    /// Milliseconds.
    delay: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Manifest {
    Frames(Vec<ManifestFrame>),
    Wrapped { frames: Vec<ManifestFrame> },
}

impl Manifest {
    fn into_frames(self) -> Vec<ManifestFrame> {
        match self {
            Manifest::Frames(frames) | Manifest::Wrapped { frames } => frames,
        }
    }
}

/// Picks the display time for one frame: the unclamped delay when the source
/// has one, else the clamped one, else the default; never below the minimum.
pub fn frame_duration(unclamped: Option<Duration>, clamped: Option<Duration>) -> Duration {
    unclamped
        .or(clamped)
        .unwrap_or(DEFAULT_FRAME_DURATION)
        .max(MIN_FRAME_DURATION)
}

pub fn decode_file(path: &Path) -> Result<DecodedAnimation, DecodeError> {
    let kind = AnimationKind::from_path(path).ok_or_else(|| {
        DecodeError::CannotOpenContainer(format!("not an animation: {}", path.display()))
    })?;
    let bytes = std::fs::read(path)
        .map_err(|e| DecodeError::CannotOpenContainer(format!("{}: {e}", path.display())))?;

    let decoded = match kind {
        AnimationKind::Gif => decode_gif(&bytes),
        AnimationKind::Ugoira => decode_ugoira(&bytes),
    }?;
    debug!(
        path = %path.display(),
        frames = decoded.len(),
        total_ms = decoded.total_duration().as_millis() as u64,
        "decoded animation"
    );
    Ok(decoded)
}

pub fn decode_gif(bytes: &[u8]) -> Result<DecodedAnimation, DecodeError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::CannotOpenContainer(e.to_string()))?;

    let controlled = graphic_control_flags(bytes);
    let mut frames = Vec::new();
    for (index, frame) in decoder.into_frames().enumerate() {
        let frame = frame.map_err(|e| DecodeError::MissingFrame(format!("#{index} ({e})")))?;

        // The graphic control extension delay is the raw, unclamped value.
        // Frames without one report a zero delay, which is not a real timing.
        let (numer, denom) = frame.delay().numer_denom_ms();
        let unclamped = (controlled.get(index) != Some(&false) && denom > 0)
            .then(|| Duration::from_micros(u64::from(numer) * 1000 / u64::from(denom)));

        frames.push(AnimationFrame {
            duration: frame_duration(unclamped, None),
            image: frame.into_buffer(),
        });
    }

    if frames.is_empty() {
        return Err(DecodeError::MissingFrame("#0".to_string()));
    }
    Ok(DecodedAnimation { frames })
}

/// One flag per image descriptor: whether a graphic control extension
/// precedes it. Empty when the block structure cannot be walked.
fn graphic_control_flags(bytes: &[u8]) -> Vec<bool> {
    walk_gif_blocks(bytes).unwrap_or_default()
}

fn walk_gif_blocks(bytes: &[u8]) -> Option<Vec<bool>> {
    if !bytes.starts_with(b"GIF8") {
        return None;
    }
    // Header (6) plus logical screen descriptor (7).
    let mut pos = 13 + color_table_len(*bytes.get(10)?);
    let mut flags = Vec::new();
    let mut pending = false;

    while let Some(&introducer) = bytes.get(pos) {
        match introducer {
            0x21 => {
                pending |= *bytes.get(pos + 1)? == 0xF9;
                pos = skip_sub_blocks(bytes, pos + 2)?;
            }
            0x2C => {
                let packed = *bytes.get(pos + 9)?;
                // Descriptor (10), local color table, LZW minimum code size (1).
                pos += 10 + color_table_len(packed) + 1;
                pos = skip_sub_blocks(bytes, pos)?;
                flags.push(std::mem::take(&mut pending));
            }
            _ => break,
        }
    }
    Some(flags)
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 == 0 {
        return 0;
    }
    3 << ((packed & 0x07) + 1)
}

fn skip_sub_blocks(bytes: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = usize::from(*bytes.get(pos)?);
        pos += 1;
        if len == 0 {
            return Some(pos);
        }
        pos += len;
    }
}

/// Decodes a ugoira archive. Any missing or unreadable frame fails the whole
/// animation.
pub fn decode_ugoira(bytes: &[u8]) -> Result<DecodedAnimation, DecodeError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::CannotOpenContainer(e.to_string()))?;

    let manifest = read_manifest(&mut archive)?;
    if manifest.is_empty() {
        return Err(DecodeError::MissingManifest);
    }

    let mut frames = Vec::with_capacity(manifest.len());
    for entry in manifest {
        let data = read_entry(&mut archive, &entry.file)
            .ok_or_else(|| DecodeError::MissingFrame(entry.file.clone()))?;
        let image = image::load_from_memory(&data)
            .map_err(|_| DecodeError::MissingFrame(entry.file.clone()))?
            .to_rgba8();

        frames.push(AnimationFrame {
            image,
            duration: frame_duration(Some(Duration::from_millis(entry.delay)), None),
        });
    }

    Ok(DecodedAnimation { frames })
}

/// Raw bytes of the first image entry in an archive, for thumbnails.
pub fn first_frame_only(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    first_image_entry(BufReader::new(file))
}

fn first_image_entry<R: Read + Seek>(reader: R) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(reader).ok()?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).ok()?;
        if entry.is_dir() || !has_image_extension(entry.name()) {
            continue;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).ok()?;
        return Some(buf);
    }
    None
}

fn read_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<ManifestFrame>, DecodeError> {
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DecodeError::CannotOpenContainer(e.to_string()))?;
        if !entry.name().to_ascii_lowercase().ends_with(".json") {
            continue;
        }

        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|_| DecodeError::MissingManifest)?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| {
            debug!(entry = entry.name(), error = %e, "unreadable ugoira manifest");
            DecodeError::MissingManifest
        })?;
        return Ok(manifest.into_frames());
    }
    Err(DecodeError::MissingManifest)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(name).ok()?;
    // The declared size is untrusted; let the buffer grow with the real data.
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).ok()?;
    Some(buf)
}

fn has_image_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame, ImageFormat, Rgba};
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn png(shade: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, Rgba([shade, 0, 0, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn gif(delays_ms: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let frames = delays_ms.iter().enumerate().map(|(i, ms)| {
                let img = RgbaImage::from_pixel(2, 2, Rgba([(i * 60) as u8, 0, 0, 255]));
                Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(*ms, 1))
            });
            encoder.encode_frames(frames).unwrap();
        }
        buf
    }

    fn archive(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
                continue;
            }
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn two_frame_manifest() -> Vec<u8> {
        br#"[{"file":"1.png","delay":100},{"file":"2.png","delay":200}]"#.to_vec()
    }

    #[test]
    fn prefers_unclamped_delay_and_enforces_minimum() {
        let ms = Duration::from_millis;
        assert_eq!(frame_duration(Some(ms(70)), Some(ms(100))), ms(70));
        assert_eq!(frame_duration(None, Some(ms(100))), ms(100));
        assert_eq!(frame_duration(None, None), DEFAULT_FRAME_DURATION);
        assert_eq!(frame_duration(Some(ms(0)), Some(ms(100))), MIN_FRAME_DURATION);
        assert_eq!(frame_duration(Some(ms(5)), None), MIN_FRAME_DURATION);
    }

    #[test]
    fn gif_durations_never_drop_below_minimum() {
        let decoded = decode_gif(&gif(&[0, 10, 50])).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            decoded.durations(),
            vec![MIN_FRAME_DURATION, MIN_FRAME_DURATION, Duration::from_millis(50)]
        );
        assert!(decoded.duration_secs().iter().all(|s| *s >= 0.02));
        assert_eq!(decoded.frames()[0].image.dimensions(), (2, 2));
    }

    /// Two 1x1 frames with no graphic control extension at all.
    fn gif_without_control_blocks() -> Vec<u8> {
        let mut bytes = b"GIF89a".to_vec();
        // 1x1 screen, two-entry global color table.
        bytes.extend_from_slice(&[1, 0, 1, 0, 0x80, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0, 255, 255, 255]);
        for _ in 0..2 {
            bytes.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0]);
            bytes.extend_from_slice(&[0x02, 0x02, 0x44, 0x01, 0x00]);
        }
        bytes.push(0x3B);
        bytes
    }

    #[test]
    fn gif_without_control_blocks_uses_default_duration() {
        let bytes = gif_without_control_blocks();
        assert_eq!(graphic_control_flags(&bytes), vec![false, false]);

        let decoded = decode_gif(&bytes).unwrap();
        assert_eq!(
            decoded.durations(),
            vec![DEFAULT_FRAME_DURATION, DEFAULT_FRAME_DURATION]
        );
    }

    #[test]
    fn encoded_gif_frames_carry_control_blocks() {
        assert_eq!(graphic_control_flags(&gif(&[0, 40])), vec![true, true]);
        assert!(graphic_control_flags(b"PNG").is_empty());
    }

    #[test]
    fn garbage_is_not_a_gif() {
        assert!(matches!(
            decode_gif(b"definitely not a gif"),
            Err(DecodeError::CannotOpenContainer(_))
        ));
    }

    #[test]
    fn ugoira_frames_follow_manifest_order_and_delays() {
        let bytes = archive(&[
            ("2.png", png(200)),
            ("animation.json", two_frame_manifest()),
            ("1.png", png(100)),
        ]);

        let decoded = decode_ugoira(&bytes).unwrap();
        assert_eq!(decoded.duration_secs(), vec![0.1, 0.2]);
        assert_eq!(decoded.frames()[0].image.get_pixel(0, 0)[0], 100);
        assert_eq!(decoded.frames()[1].image.get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn ugoira_accepts_wrapped_manifest() {
        let bytes = archive(&[
            ("1.png", png(1)),
            ("meta.json", br#"{"frames":[{"file":"1.png","delay":40}]}"#.to_vec()),
        ]);
        let decoded = decode_ugoira(&bytes).unwrap();
        assert_eq!(decoded.durations(), vec![Duration::from_millis(40)]);
    }

    #[test]
    fn ugoira_missing_frame_fails_whole_decode() {
        let bytes = archive(&[("animation.json", two_frame_manifest()), ("1.png", png(1))]);
        match decode_ugoira(&bytes) {
            Err(DecodeError::MissingFrame(name)) => assert_eq!(name, "2.png"),
            other => panic!("expected missing frame, got {other:?}"),
        }
    }

    #[test]
    fn ugoira_corrupt_frame_is_reported_by_name() {
        let bytes = archive(&[
            ("animation.json", two_frame_manifest()),
            ("1.png", png(1)),
            ("2.png", b"not a png".to_vec()),
        ]);
        assert!(matches!(
            decode_ugoira(&bytes),
            Err(DecodeError::MissingFrame(name)) if name == "2.png"
        ));
    }

    #[test]
    fn ugoira_without_manifest() {
        let bytes = archive(&[("1.png", png(1))]);
        assert!(matches!(decode_ugoira(&bytes), Err(DecodeError::MissingManifest)));
        assert!(matches!(
            decode_ugoira(b"PK broken"),
            Err(DecodeError::CannotOpenContainer(_))
        ));
    }

    #[test]
    fn first_frame_skips_manifest_and_directories() {
        let frame = png(9);
        let bytes = archive(&[
            ("animation.json", two_frame_manifest()),
            ("frames/", Vec::new()),
            ("1.PNG", frame.clone()),
            ("2.png", png(10)),
        ]);
        assert_eq!(first_image_entry(Cursor::new(bytes)), Some(frame));

        let no_images = archive(&[("animation.json", two_frame_manifest())]);
        assert_eq!(first_image_entry(Cursor::new(no_images)), None);
    }

    #[test]
    fn decode_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let gif_path = dir.path().join("1.gif");
        std::fs::write(&gif_path, gif(&[30, 30])).unwrap();
        let zip_path = dir.path().join("2.zip");
        std::fs::write(
            &zip_path,
            archive(&[("animation.json", two_frame_manifest()), ("1.png", png(1)), ("2.png", png(2))]),
        )
        .unwrap();

        assert_eq!(decode_file(&gif_path).unwrap().len(), 2);
        assert_eq!(decode_file(&zip_path).unwrap().len(), 2);
        assert!(first_frame_only(&zip_path).is_some());
        assert!(matches!(
            decode_file(&dir.path().join("3.png")),
            Err(DecodeError::CannotOpenContainer(_))
        ));
        assert_eq!(AnimationKind::from_path(Path::new("a.UGOIRA")), Some(AnimationKind::Ugoira));
    }
}

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag, Value};

use super::Bucket;

/// Seconds between the QuickTime epoch (1904-01-01) and the Unix epoch.
const QUICKTIME_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Dates embedded in a media file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddedDates {
    /// "Date created": EXIF DateTimeDigitized, or the QuickTime movie header
    pub created: Option<NaiveDateTime>,
    /// "Date taken": EXIF DateTimeOriginal, falling back to DateTime
    pub original: Option<NaiveDateTime>,
}

impl EmbeddedDates {
    /// Created date if present, otherwise the original date.
    pub fn preferred(&self) -> Option<NaiveDateTime> {
        self.created.or(self.original)
    }

    /// Bucket for the created date, or the original date when the created
    /// one is missing or cannot form a bucket (year zero); the sentinel when
    /// neither can.
    pub fn bucket(&self) -> Bucket {
        self.created
            .and_then(|dt| Bucket::from_datetime(&dt))
            .or_else(|| self.original.and_then(|dt| Bucket::from_datetime(&dt)))
            .unwrap_or(Bucket::SENTINEL)
    }
}

/// Read embedded dates from a media file on disk.
/// QuickTime-family videos are read from their movie header, everything else as an EXIF container.
pub fn read_embedded_dates(path: &Path) -> anyhow::Result<EmbeddedDates> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    if is_quicktime(path) {
        read_quicktime_dates(&mut reader)
    } else {
        read_exif_dates(&mut reader)
    }
}

fn is_quicktime(path: &Path) -> bool {
    mime_guess::from_path(path).first().map_or(false, |mime| {
        matches!(
            mime.essence_str(),
            "video/mp4" | "video/quicktime" | "video/3gpp" | "video/x-m4v"
        )
    })
}

/// EXIF datetimes have no timezone info - they are local time as-is.
pub fn read_exif_dates<R: BufRead + Seek>(reader: &mut R) -> anyhow::Result<EmbeddedDates> {
    let exif = Reader::new().read_from_container(reader)?;
    let field_date = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|field| ascii_datetime(&field.value))
    };

    Ok(EmbeddedDates {
        created: field_date(Tag::DateTimeDigitized),
        original: field_date(Tag::DateTimeOriginal).or_else(|| field_date(Tag::DateTime)),
    })
}

fn ascii_datetime(value: &Value) -> Option<NaiveDateTime> {
    let Value::Ascii(ref parts) = *value else {
        return None;
    };
    let raw = parts.first()?;
    match exif::DateTime::from_ascii(raw) {
        Ok(dt) => NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
            .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into()),
        Err(_) => parse_loose_datetime(&String::from_utf8_lossy(raw)),
    }
}

/// Some writers use `-`, `/` or `.` between date parts; all-zero dates yield `None`.
fn parse_loose_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim_end_matches('\0')
        .replace(['-', '/', '\\', '.'], ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

/// Read the creation time from the `moov/mvhd` box of an ISO base media file.
pub fn read_quicktime_dates<R: Read + Seek>(reader: &mut R) -> anyhow::Result<EmbeddedDates> {
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let moov_end = find_box(reader, *b"moov", end)?.context("no moov box")?;
    find_box(reader, *b"mvhd", moov_end)?.context("no mvhd box in moov")?;

    let mut version_flags = [0u8; 4];
    reader.read_exact(&mut version_flags)?;
    let secs = if version_flags[0] == 1 {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        u64::from_be_bytes(buf)
    } else {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        u64::from(u32::from_be_bytes(buf))
    };

    // Encoders that don't know the date write zero
    let created = if secs == 0 {
        None
    } else {
        i64::try_from(secs)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s - QUICKTIME_EPOCH_OFFSET, 0))
            .map(|utc| utc.naive_utc())
    };

    Ok(EmbeddedDates {
        created,
        original: None,
    })
}

/// Scan sibling boxes up to `end` and position the reader at the payload of the
/// first one named `kind`. Returns that box's end offset.
fn find_box<R: Read + Seek>(reader: &mut R, kind: [u8; 4], end: u64) -> anyhow::Result<Option<u64>> {
    loop {
        let start = reader.stream_position()?;
        if start + 8 > end {
            return Ok(None);
        }

        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let mut size = u64::from(u32::from_be_bytes([header[0], header[1], header[2], header[3]]));
        let mut header_len = 8;
        if size == 1 {
            let mut large = [0u8; 8];
            reader.read_exact(&mut large)?;
            size = u64::from_be_bytes(large);
            header_len = 16;
        } else if size == 0 {
            // Box extends to the end of its container
            size = end - start;
        }
        if size < header_len {
            bail!("malformed box header at offset {}", start);
        }

        let box_end = start.saturating_add(size).min(end);
        if header[4..8] == kind {
            return Ok(Some(box_end));
        }
        reader.seek(SeekFrom::Start(box_end))?;
    }
}

/// Minimal JPEG whose only EXIF tag is DateTimeOriginal.
#[cfg(test)]
pub(crate) fn jpeg_with_date_original(date: &str) -> Vec<u8> {
    assert_eq!(date.len(), 19, "EXIF dates are YYYY:MM:DD HH:MM:SS");

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    // IFD0 at 8: a single pointer to the Exif IFD at 26
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    // Exif IFD at 26: DateTimeOriginal, ASCII, 20 bytes stored at 44
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9003u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&20u32.to_le_bytes());
    tiff.extend_from_slice(&44u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(date.as_bytes());
    tiff.push(0);

    let segment_len = (2 + 6 + tiff.len()) as u16;
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend_from_slice(&segment_len.to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

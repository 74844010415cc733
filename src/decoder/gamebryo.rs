//! Header reader for Gamebryo and Creation Engine savegames (`.ess` / `.fos`).
//!
//! Four layouts are understood:
//!
//! | Magic | Games |
//! |---|---|
//! | `TES4SAVEGAME` | Oblivion |
//! | `FO3SAVEGAME` | Fallout 3, Fallout: New Vegas |
//! | `TESV_SAVEGAME` | Skyrim (LE, SE, VR), Enderal |
//! | `FO4_SAVEGAME` | Fallout 4, Fallout 4 VR |
//!
//! Only the leading header, the screenshot and the master plugin list are
//! read. The change-form body is never touched.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use super::{DecodeError, SaveDecoder};
use crate::types::{SaveMetadata, Screenshot};

const TES4_MAGIC: &[u8] = b"TES4SAVEGAME";
const FO3_MAGIC: &[u8] = b"FO3SAVEGAME";
const TESV_MAGIC: &[u8] = b"TESV_SAVEGAME";
const FO4_MAGIC: &[u8] = b"FO4_SAVEGAME";

/// Fallout 3 and New Vegas follow every header field with this byte.
const FIELD_SEPARATOR: u8 = b'|';

/// First TESV header version that carries a compression field and RGBA shots.
const TESV_SE_VERSION: u32 = 12;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Tesv,
    Fallout4,
}

#[derive(Error, Debug)]
enum ParseError {
    #[error("unknown file signature")]
    UnknownSignature,

    #[error("unexpected end of data at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("missing field separator at offset {offset}")]
    MissingSeparator { offset: usize },

    #[error("screenshot dimensions {width}x{height} are out of range")]
    ScreenshotSize { width: u32, height: u32 },
}

/// Decoder for Oblivion, Fallout 3/New Vegas, Skyrim, Enderal and Fallout 4 savegames.
#[derive(Debug, Default, Clone, Copy)]
pub struct GamebryoDecoder;

impl GamebryoDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SaveDecoder for GamebryoDecoder {
    async fn decode(&self, path: &Path) -> Result<SaveMetadata, DecodeError> {
        let bytes = tokio::fs::read(path).await.map_err(DecodeError::from_io)?;

        match parse_save(&bytes) {
            Ok(metadata) => Ok(metadata),
            Err(e @ ParseError::Truncated { .. }) => {
                // A short read usually means the game is still writing. Opening
                // the file again tells us whether it is actually locked.
                match tokio::fs::File::open(path).await {
                    Err(io_err) => Err(DecodeError::from_io(io_err)),
                    Ok(_) => Err(DecodeError::Format(e.to_string())),
                }
            }
            Err(e) => Err(DecodeError::Format(e.to_string())),
        }
    }
}

fn parse_save(bytes: &[u8]) -> Result<SaveMetadata, ParseError> {
    if bytes.starts_with(TESV_MAGIC) {
        parse_creation(bytes, Flavor::Tesv, TESV_MAGIC.len())
    } else if bytes.starts_with(FO4_MAGIC) {
        parse_creation(bytes, Flavor::Fallout4, FO4_MAGIC.len())
    } else if bytes.starts_with(TES4_MAGIC) {
        parse_oblivion(bytes)
    } else if bytes.starts_with(FO3_MAGIC) {
        parse_fallout3(bytes)
    } else {
        Err(ParseError::UnknownSignature)
    }
}

/// Skyrim and Fallout 4.
fn parse_creation(
    bytes: &[u8],
    flavor: Flavor,
    magic_len: usize,
) -> Result<SaveMetadata, ParseError> {
    let mut r = Reader::new(bytes);
    r.skip(magic_len)?;

    let header_size = r.u32()? as usize;
    let header_start = r.pos;

    let version = r.u32()?;
    let save_number = r.u32()?;
    let character_name = r.wstring()?;
    let level = r.u32()?;
    let location = r.wstring()?;
    let game_time = r.wstring()?;
    let race = r.wstring()?;
    // sex (u16), current exp (f32), level-up exp (f32)
    r.skip(2 + 4 + 4)?;
    let filetime = r.u64()?;
    let width = r.u32()?;
    let height = r.u32()?;
    let compressed = if flavor == Flavor::Tesv && version >= TESV_SE_VERSION {
        r.u16()? != 0
    } else {
        false
    };

    r.seek(header_start + header_size)?;

    let bytes_per_pixel: u8 = if flavor == Flavor::Tesv && version < TESV_SE_VERSION {
        3
    } else {
        4
    };
    let screenshot = read_screenshot(&mut r, width, height, bytes_per_pixel)?;

    // Compressed bodies (Skyrim SE) keep the plugin list behind LZ4/zlib.
    let plugins = if compressed {
        Vec::new()
    } else {
        read_plugins(&mut r, flavor)?
    };

    Ok(SaveMetadata {
        save_number,
        character_name,
        level,
        location,
        game_time,
        race,
        plugins,
        screenshot,
        created_at: filetime_to_utc(filetime),
    })
}

fn read_plugins(r: &mut Reader<'_>, flavor: Flavor) -> Result<Vec<String>, ParseError> {
    let _form_version = r.u8()?;
    if flavor == Flavor::Fallout4 {
        let _game_version = r.wstring()?;
    }
    let _plugin_info_size = r.u32()?;
    let count = r.u8()?;

    (0..count).map(|_| r.wstring()).collect()
}

/// Oblivion: byte-length strings, no race, real-world save time as SYSTEMTIME.
fn parse_oblivion(bytes: &[u8]) -> Result<SaveMetadata, ParseError> {
    let mut r = Reader::new(bytes);
    r.skip(TES4_MAGIC.len())?;

    // major/minor version, executable timestamp
    r.skip(1 + 1 + 16)?;
    let _header_version = r.u32()?;
    let _header_size = r.u32()?;
    let save_number = r.u32()?;
    let character_name = r.bzstring()?;
    let level = u32::from(r.u16()?);
    let location = r.bzstring()?;
    let _game_days = r.f32()?;
    let played_ms = r.u32()?;
    let saved_at = r.systemtime()?;
    let _screenshot_size = r.u32()?;
    let width = r.u32()?;
    let height = r.u32()?;
    let screenshot = read_screenshot(&mut r, width, height, 3)?;

    let count = r.u8()?;
    let plugins = (0..count)
        .map(|_| r.bstring())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SaveMetadata {
        save_number,
        character_name,
        level,
        location,
        game_time: format_play_time(played_ms),
        race: String::new(),
        plugins,
        screenshot,
        created_at: saved_at,
    })
}

/// Fallout 3 and New Vegas: `|`-separated fields, no timestamp, no race.
fn parse_fallout3(bytes: &[u8]) -> Result<SaveMetadata, ParseError> {
    let mut r = Reader::new(bytes);
    r.skip(FO3_MAGIC.len())?;

    let _header_size = r.u32()?;
    let _version = r.u32()?;
    r.separator()?;

    // New Vegas inserts a fixed-width text block, ended by a separator,
    // before the screenshot width.
    if r.peek(4) != Some(FIELD_SEPARATOR) {
        r.skip_past(FIELD_SEPARATOR)?;
    }

    let width = r.field_u32()?;
    let height = r.field_u32()?;
    let save_number = r.field_u32()?;
    let character_name = r.field_wstring()?;
    let _karma = r.field_wstring()?;
    let level = r.field_u32()?;
    let location = r.field_wstring()?;
    let game_time = r.field_wstring()?;
    let screenshot = read_screenshot(&mut r, width, height, 3)?;

    // The plugin block differs between builds; a save without a readable
    // one is still listed.
    let plugins = read_fallout3_plugins(&mut r).unwrap_or_default();

    Ok(SaveMetadata {
        save_number,
        character_name,
        level,
        location,
        game_time,
        race: String::new(),
        plugins,
        screenshot,
        created_at: None,
    })
}

fn read_fallout3_plugins(r: &mut Reader<'_>) -> Result<Vec<String>, ParseError> {
    let _form_version = r.u8()?;
    r.separator()?;
    let _plugin_info_size = r.field_u32()?;
    let count = r.u8()?;
    r.separator()?;

    (0..count).map(|_| r.field_wstring()).collect()
}

fn read_screenshot(
    r: &mut Reader<'_>,
    width: u32,
    height: u32,
    bytes_per_pixel: u8,
) -> Result<Screenshot, ParseError> {
    let pixel_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(bytes_per_pixel as usize))
        .ok_or(ParseError::ScreenshotSize { width, height })?;

    Ok(Screenshot {
        width,
        height,
        bytes_per_pixel,
        pixels: r.take(pixel_len)?.to_vec(),
    })
}

fn filetime_to_utc(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let secs = (filetime / 10_000_000) as i64 - FILETIME_UNIX_OFFSET;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// `H.MM.SS` from milliseconds played.
fn format_play_time(played_ms: u32) -> String {
    let secs = played_ms / 1000;
    format!("{}.{:02}.{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Little-endian cursor over the raw file bytes.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ParseError::Truncated {
                offset: self.pos,
                needed: n,
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.take(n).map(|_| ())
    }

    fn seek(&mut self, pos: usize) -> Result<(), ParseError> {
        if pos > self.buf.len() {
            return Err(ParseError::Truncated {
                offset: self.buf.len(),
                needed: pos - self.buf.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Byte `offset` positions ahead, without consuming anything.
    fn peek(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos.checked_add(offset)?).copied()
    }

    /// Consume everything up to and including the next `byte`.
    fn skip_past(&mut self, byte: u8) -> Result<(), ParseError> {
        let rest = &self.buf[self.pos..];
        let found = rest
            .iter()
            .position(|&b| b == byte)
            .ok_or(ParseError::Truncated {
                offset: self.buf.len(),
                needed: 1,
            })?;
        self.pos += found + 1;
        Ok(())
    }

    fn separator(&mut self) -> Result<(), ParseError> {
        let offset = self.pos;
        if self.u8()? != FIELD_SEPARATOR {
            return Err(ParseError::MissingSeparator { offset });
        }
        Ok(())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, ParseError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, ParseError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn field_u32(&mut self) -> Result<u32, ParseError> {
        let value = self.u32()?;
        self.separator()?;
        Ok(value)
    }

    /// u16 length-prefixed string. Saves use the Windows ANSI code page, so
    /// anything outside ASCII is decoded lossily.
    fn wstring(&mut self) -> Result<String, ParseError> {
        let len = self.u16()? as usize;
        self.text(len)
    }

    /// `len|text|`
    fn field_wstring(&mut self) -> Result<String, ParseError> {
        let len = self.u16()? as usize;
        self.separator()?;
        let value = self.text(len)?;
        self.separator()?;
        Ok(value)
    }

    /// u8 length-prefixed string.
    fn bstring(&mut self) -> Result<String, ParseError> {
        let len = self.u8()? as usize;
        self.text(len)
    }

    /// u8 length-prefixed, NUL-terminated string; the length counts the NUL.
    fn bzstring(&mut self) -> Result<String, ParseError> {
        let len = self.u8()? as usize;
        let raw = self.take(len)?;
        let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    fn text(&mut self, len: usize) -> Result<String, ParseError> {
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Windows SYSTEMTIME, taken as UTC.
    fn systemtime(&mut self) -> Result<Option<DateTime<Utc>>, ParseError> {
        let mut fields = [0u16; 8];
        for field in &mut fields {
            *field = self.u16()?;
        }
        let [year, month, _day_of_week, day, hour, minute, second, millis] = fields;

        Ok(
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_milli_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        u32::from(millis),
                    )
                })
                .map(|time| time.and_utc()),
        )
    }
}

//! XLSX emphasis parser: resolves bold/italic per cellXfs index from
//! styles.xml and per-cell style IDs from one worksheet's XML.
//!
//! calamine exposes values only, so font flags are read straight from the
//! archive.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::LoadError;

// =============================================================================
// Public types
// =============================================================================

/// Font emphasis of one style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emphasis {
    pub bold: bool,
    pub italic: bool,
}

impl Emphasis {
    fn is_plain(&self) -> bool {
        !self.bold && !self.italic
    }
}

/// Parsed style table from styles.xml: cellXfs index → emphasis.
#[derive(Debug, Default)]
pub struct StyleTable {
    pub styles: Vec<Emphasis>,
}

impl StyleTable {
    pub fn get(&self, id: usize) -> Option<Emphasis> {
        self.styles.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Emphasised cells of one worksheet, keyed by 0-based (row, col).
#[derive(Debug, Default)]
pub struct SheetEmphasis {
    cells: HashMap<(usize, usize), Emphasis>,
}

impl SheetEmphasis {
    pub fn get(&self, row: usize, col: usize) -> Emphasis {
        self.cells.get(&(row, col)).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// =============================================================================
// styles.xml parser
// =============================================================================

/// Parse styles.xml content into a StyleTable.
pub fn parse_styles_xml(xml: &str) -> StyleTable {
    let fonts = parse_fonts(xml);
    StyleTable { styles: parse_cell_xfs(xml, &fonts) }
}

/// Attribute value by key, raw bytes read lossily.
fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// `<b/>` and `<i/>` are on unless they carry `val="0"` / `val="false"`.
fn flag_on(e: &BytesStart) -> bool {
    attr(e, b"val").map_or(true, |v| v != "0" && v != "false")
}

/// Parse <fonts> section into one Emphasis per <font>.
fn parse_fonts(xml: &str) -> Vec<Emphasis> {
    let mut fonts = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <fonts>, 2 = inside <font>

    let mut current_font = Emphasis::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"fonts" if depth == 0 => depth = 1,
                b"font" if depth == 1 => {
                    depth = 2;
                    current_font = Emphasis::default();
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"font" if depth == 1 => fonts.push(Emphasis::default()),
                b"b" if depth == 2 => current_font.bold = flag_on(e),
                b"i" if depth == 2 => current_font.italic = flag_on(e),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"font" if depth == 2 => {
                    fonts.push(current_font);
                    depth = 1;
                }
                b"fonts" if depth == 1 => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    fonts
}

fn xf_font_id(e: &BytesStart) -> Option<usize> {
    attr(e, b"fontId")?.parse().ok()
}

/// Parse <cellXfs> and resolve each <xf> to its font's emphasis.
fn parse_cell_xfs(xml: &str, fonts: &[Emphasis]) -> Vec<Emphasis> {
    let mut styles = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;

    let resolve = |font_id: Option<usize>| {
        font_id.and_then(|id| fonts.get(id).copied()).unwrap_or_default()
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => styles.push(resolve(xf_font_id(e))),
                _ => {}
            },
            // Self-closing <xf .../>
            Ok(Event::Empty(ref e)) if in_cell_xfs && e.name().as_ref() == b"xf" => {
                styles.push(resolve(xf_font_id(e)));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"cellXfs" => break,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    styles
}

// =============================================================================
// Worksheet XML
// =============================================================================

/// Emphasised cells of one worksheet's XML. Cells whose style resolves to
/// neither bold nor italic are left out, so lookups default to plain.
pub fn parse_sheet_emphasis(xml: &str, table: &StyleTable) -> SheetEmphasis {
    let mut cells = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"c" => {
                let emphasis = attr(e, b"s")
                    .and_then(|id| id.parse::<usize>().ok())
                    .and_then(|id| table.get(id))
                    .filter(|emphasis| !emphasis.is_plain());
                let position = attr(e, b"r").as_deref().and_then(cell_position);
                if let (Some(emphasis), Some(position)) = (emphasis, position) {
                    cells.insert(position, emphasis);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    SheetEmphasis { cells }
}

/// 0-based (row, col) of an A1 reference such as `C10`.
fn cell_position(r: &str) -> Option<(usize, usize)> {
    let (letters, digits) = r.split_at(r.find(|c: char| c.is_ascii_digit())?);
    if letters.is_empty() {
        return None;
    }
    let col = letters.bytes().try_fold(0usize, |acc, b| {
        b.is_ascii_alphabetic()
            .then(|| acc * 26 + usize::from(b.to_ascii_uppercase() - b'A') + 1)
    })?;
    let row = digits.parse::<usize>().ok()?.checked_sub(1)?;
    Some((row, col - 1))
}

// =============================================================================
// Entry point
// =============================================================================

/// Read bold/italic flags for every styled cell of `sheet_name`.
///
/// A workbook without styles.xml, or whose sheet cannot be located in the
/// relationships, yields an empty map: every cell reads as plain.
pub fn read_sheet_emphasis(path: &Path, sheet_name: &str) -> Result<SheetEmphasis, LoadError> {
    let file = std::fs::File::open(path).map_err(|e| LoadError::Styles(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| LoadError::Styles(e.to_string()))?;

    let Some(styles_xml) = read_part(&mut archive, "xl/styles.xml")? else {
        log::debug!("{}: no styles part, every cell reads as plain", path.display());
        return Ok(SheetEmphasis::default());
    };
    let table = parse_styles_xml(&styles_xml);

    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?.unwrap_or_default();
    let rels_xml = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?.unwrap_or_default();
    let Some(ws_path) = resolve_worksheet_path(&workbook_xml, &rels_xml, sheet_name) else {
        log::warn!("{}: no worksheet part for sheet '{sheet_name}', reading without emphasis", path.display());
        return Ok(SheetEmphasis::default());
    };

    match read_part(&mut archive, &ws_path)? {
        Some(sheet_xml) => Ok(parse_sheet_emphasis(&sheet_xml, &table)),
        None => Err(LoadError::Styles(format!("worksheet part '{ws_path}' is missing"))),
    }
}

// =============================================================================
// Package parts
// =============================================================================

/// One part of the package as text, `None` when the archive has no such entry.
fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>, LoadError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(LoadError::Styles(format!("{name}: {e}"))),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| LoadError::Styles(format!("{name}: {e}")))?;
    Ok(Some(xml))
}

/// `want` attribute of the first `<tag>` whose `key` attribute is `value`.
fn find_attr(xml: &str, tag: &[u8], key: &[u8], value: &str, want: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == tag && attr(e, key).as_deref() == Some(value) =>
            {
                return attr(e, want);
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Worksheet part of `sheet_name`: workbook.xml gives the relationship id,
/// the workbook rels give its target. Targets are relative to `xl/` unless
/// absolute.
fn resolve_worksheet_path(workbook_xml: &str, rels_xml: &str, sheet_name: &str) -> Option<String> {
    let rid = find_attr(workbook_xml, b"sheet", b"name", sheet_name, b"r:id")?;
    let target = find_attr(rels_xml, b"Relationship", b"Id", &rid, b"Target")?;
    Some(match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("xl/{target}"),
    })
}

// =============================================================================
// Tests
// =============================================================================

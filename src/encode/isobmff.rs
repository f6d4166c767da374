//! Just enough ISO-BMFF to attach an XMP item to an existing AVIF file.
//!
//! The XMP bytes go into a trailing `mdat`. The `meta` box grows by one `infe`, one `iloc`
//! entry and one `cdsc` reference, so every absolute offset that points past the old `meta`
//! box (`iloc` construction-method-0 extents, `stco`, `co64`) is shifted by the growth.

use std::ops::Range;

use super::{EncoderFailure, EncoderFailureKind};

/// MIME type of the XMP item.
pub const XMP_CONTENT_TYPE: &str = "application/rdf+xml";

/// Location of one box inside a byte buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    /// Four-character box type.
    pub kind: [u8; 4],
    /// Offset of the first header byte.
    pub start: usize,
    /// Header length (8, or 16 with a 64-bit size).
    pub header_len: usize,
    /// Offset one past the last byte.
    pub end: usize,
    /// Whether the size field was 0 ("extends to end of file").
    pub to_eof: bool,
}

impl BoxHeader {
    /// Byte range of the payload.
    pub fn body(&self) -> Range<usize> {
        self.start + self.header_len..self.end
    }

    /// Total box length.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Return `true` for a header-only box.
    pub fn is_empty(&self) -> bool {
        self.len() == self.header_len
    }
}

fn layout(msg: impl Into<String>) -> EncoderFailure {
    EncoderFailure::new(EncoderFailureKind::UnsupportedLayout, msg)
}

fn fourcc(kind: &[u8; 4]) -> String {
    String::from_utf8_lossy(kind).into_owned()
}

/// List the boxes stored back to back in `data[range]`.
pub fn read_boxes(data: &[u8], range: Range<usize>) -> Result<Vec<BoxHeader>, EncoderFailure> {
    if range.end > data.len() {
        return Err(layout("box range exceeds buffer"));
    }
    let mut boxes = Vec::new();
    let mut pos = range.start;
    while pos < range.end {
        let mut r = Reader::new(data, pos..range.end);
        let size32 = r.u32()?;
        let kind = r.fourcc()?;
        let (header_len, size, to_eof) = match size32 {
            0 => (8, range.end - pos, true),
            1 => {
                let large = usize::try_from(r.u64()?)
                    .map_err(|_| layout("box size does not fit in memory"))?;
                (16, large, false)
            }
            n => (8, n as usize, false),
        };
        let end = pos
            .checked_add(size)
            .filter(|end| size >= header_len && *end <= range.end)
            .ok_or_else(|| layout(format!("box '{}' overruns its parent", fourcc(&kind))))?;
        boxes.push(BoxHeader {
            kind,
            start: pos,
            header_len,
            end,
            to_eof,
        });
        pos = end;
    }
    Ok(boxes)
}

/// Bounds-checked big-endian reader.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8], range: Range<usize>) -> Self {
        Self {
            data,
            pos: range.start,
            end: range.end.min(data.len()),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], EncoderFailure> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.end)
            .ok_or_else(|| layout("truncated box payload"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, EncoderFailure> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, EncoderFailure> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, EncoderFailure> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, EncoderFailure> {
        Ok((u64::from(self.u32()?) << 32) | u64::from(self.u32()?))
    }

    pub(crate) fn fourcc(&mut self) -> Result<[u8; 4], EncoderFailure> {
        let b = self.bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Read a 0/4/8-byte unsigned field.
    pub(crate) fn uint(&mut self, size: u8) -> Result<u64, EncoderFailure> {
        match size {
            0 => Ok(0),
            4 => Ok(u64::from(self.u32()?)),
            8 => self.u64(),
            n => Err(layout(format!("unsupported field size {n}"))),
        }
    }

    /// Read a FullBox version/flags word.
    pub(crate) fn full_box(&mut self) -> Result<(u8, u32), EncoderFailure> {
        let word = self.u32()?;
        Ok(((word >> 24) as u8, word & 0x00ff_ffff))
    }
}

pub(crate) fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn write_full_box(out: &mut Vec<u8>, version: u8, flags: u32) {
    write_u32(out, (u32::from(version) << 24) | (flags & 0x00ff_ffff));
}

fn write_uint(out: &mut Vec<u8>, v: u64, size: u8) -> Result<(), EncoderFailure> {
    match size {
        0 if v == 0 => Ok(()),
        4 => {
            let v = u32::try_from(v).map_err(|_| layout("offset does not fit in 32 bits"))?;
            write_u32(out, v);
            Ok(())
        }
        8 => {
            out.extend_from_slice(&v.to_be_bytes());
            Ok(())
        }
        n => Err(layout(format!("cannot store {v} in a {n}-byte field"))),
    }
}

fn write_id(out: &mut Vec<u8>, id: u32, wide: bool) -> Result<(), EncoderFailure> {
    if wide {
        write_u32(out, id);
    } else {
        let id = u16::try_from(id).map_err(|_| layout("item id does not fit in 16 bits"))?;
        write_u16(out, id);
    }
    Ok(())
}

/// Start a box and return its position for [`end_box`].
pub(crate) fn begin_box(out: &mut Vec<u8>, kind: &[u8; 4]) -> usize {
    let pos = out.len();
    write_u32(out, 0);
    out.extend_from_slice(kind);
    pos
}

/// Size field for a box spanning `len` bytes; boxes are written with 32-bit sizes only.
fn box_size(len: usize) -> Result<u32, EncoderFailure> {
    u32::try_from(len).map_err(|_| layout(format!("box of {len} bytes exceeds 32-bit size")))
}

/// Patch the size of the box started at `pos`.
pub(crate) fn end_box(out: &mut [u8], pos: usize) -> Result<(), EncoderFailure> {
    let size = box_size(out.len() - pos)?;
    out[pos..pos + 4].copy_from_slice(&size.to_be_bytes());
    Ok(())
}

/// One extent of an `iloc` item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct IlocExtent {
    pub(crate) index: u64,
    pub(crate) offset: u64,
    pub(crate) length: u64,
}

/// One `iloc` item entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct IlocItem {
    pub(crate) id: u32,
    pub(crate) construction_method: u8,
    pub(crate) data_reference_index: u16,
    pub(crate) base_offset: u64,
    pub(crate) extents: Vec<IlocExtent>,
}

impl IlocItem {
    /// Whether extents are absolute offsets into this file.
    fn is_file_relative(&self) -> bool {
        self.construction_method == 0 && self.data_reference_index == 0
    }
}

/// Parsed `iloc` box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ItemLocation {
    pub(crate) version: u8,
    pub(crate) flags: u32,
    pub(crate) offset_size: u8,
    pub(crate) length_size: u8,
    pub(crate) base_offset_size: u8,
    pub(crate) index_size: u8,
    pub(crate) items: Vec<IlocItem>,
}

impl ItemLocation {
    pub(crate) fn parse(data: &[u8], header: &BoxHeader) -> Result<Self, EncoderFailure> {
        let mut r = Reader::new(data, header.body());
        let (version, flags) = r.full_box()?;
        if version > 2 {
            return Err(layout(format!("unsupported iloc version {version}")));
        }
        let sizes = r.u8()?;
        let more = r.u8()?;
        let offset_size = sizes >> 4;
        let length_size = sizes & 0x0f;
        let base_offset_size = more >> 4;
        let index_size = if version >= 1 { more & 0x0f } else { 0 };
        let count = if version < 2 {
            u32::from(r.u16()?)
        } else {
            r.u32()?
        };

        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = if version < 2 {
                u32::from(r.u16()?)
            } else {
                r.u32()?
            };
            let construction_method = if version >= 1 {
                (r.u16()? & 0x0f) as u8
            } else {
                0
            };
            let data_reference_index = r.u16()?;
            let base_offset = r.uint(base_offset_size)?;
            let extent_count = r.u16()?;
            let mut extents = Vec::with_capacity(usize::from(extent_count));
            for _ in 0..extent_count {
                let index = if index_size > 0 {
                    r.uint(index_size)?
                } else {
                    0
                };
                let offset = r.uint(offset_size)?;
                let length = r.uint(length_size)?;
                extents.push(IlocExtent {
                    index,
                    offset,
                    length,
                });
            }
            items.push(IlocItem {
                id,
                construction_method,
                data_reference_index,
                base_offset,
                extents,
            });
        }

        Ok(Self {
            version,
            flags,
            offset_size,
            length_size,
            base_offset_size,
            index_size,
            items,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<(), EncoderFailure> {
        let pos = begin_box(out, b"iloc");
        write_full_box(out, self.version, self.flags);
        out.push((self.offset_size << 4) | self.length_size);
        let index_size = if self.version >= 1 { self.index_size } else { 0 };
        out.push((self.base_offset_size << 4) | index_size);
        let wide = self.version >= 2;
        if wide {
            let count =
                u32::try_from(self.items.len()).map_err(|_| layout("too many items for iloc"))?;
            write_u32(out, count);
        } else {
            let count = u16::try_from(self.items.len())
                .map_err(|_| layout("too many items for iloc version 0/1"))?;
            write_u16(out, count);
        }
        for item in &self.items {
            write_id(out, item.id, wide)?;
            if self.version >= 1 {
                write_u16(out, u16::from(item.construction_method & 0x0f));
            }
            write_u16(out, item.data_reference_index);
            write_uint(out, item.base_offset, self.base_offset_size)?;
            let extent_count = u16::try_from(item.extents.len())
                .map_err(|_| layout("too many extents in one item"))?;
            write_u16(out, extent_count);
            for e in &item.extents {
                if index_size > 0 {
                    write_uint(out, e.index, index_size)?;
                }
                write_uint(out, e.offset, self.offset_size)?;
                write_uint(out, e.length, self.length_size)?;
            }
        }
        end_box(out, pos)
    }

    /// Move every file-relative extent that starts at or after `meta.end` by `delta` bytes.
    fn shift(&mut self, meta: &BoxHeader, delta: u64) -> Result<(), EncoderFailure> {
        let meta_start = meta.start as u64;
        let meta_end = meta.end as u64;
        for item in self.items.iter_mut().filter(|i| i.is_file_relative()) {
            let absolute: Vec<u64> = item
                .extents
                .iter()
                .map(|e| item.base_offset.saturating_add(e.offset))
                .collect();
            if absolute.iter().any(|a| (meta_start..meta_end).contains(a)) {
                return Err(layout(format!(
                    "item {} points inside the meta box",
                    item.id
                )));
            }
            if !absolute.iter().any(|a| *a >= meta_end) {
                continue;
            }
            if self.base_offset_size > 0 && item.base_offset >= meta_end {
                item.base_offset += delta;
                continue;
            }
            for (e, a) in item.extents.iter_mut().zip(absolute) {
                if a >= meta_end {
                    e.offset += delta;
                }
            }
        }
        Ok(())
    }
}

fn parse_pitm(data: &[u8], header: &BoxHeader) -> Result<u32, EncoderFailure> {
    let mut r = Reader::new(data, header.body());
    let (version, _) = r.full_box()?;
    if version == 0 {
        Ok(u32::from(r.u16()?))
    } else {
        r.u32()
    }
}

/// Item information box: entry count plus the raw `infe` children.
struct ItemInfo {
    version: u8,
    flags: u32,
    count: u32,
    entries: Range<usize>,
    ids: Vec<u32>,
}

impl ItemInfo {
    fn parse(data: &[u8], header: &BoxHeader) -> Result<Self, EncoderFailure> {
        let body = header.body();
        let mut r = Reader::new(data, body.clone());
        let (version, flags) = r.full_box()?;
        let count = if version == 0 {
            u32::from(r.u16()?)
        } else {
            r.u32()?
        };
        let entries = r.position()..body.end;
        let mut ids = Vec::new();
        for infe in read_boxes(data, entries.clone())?
            .iter()
            .filter(|b| &b.kind == b"infe")
        {
            let mut r = Reader::new(data, infe.body());
            let (v, _) = r.full_box()?;
            ids.push(if v >= 3 {
                r.u32()?
            } else {
                u32::from(r.u16()?)
            });
        }
        Ok(Self {
            version,
            flags,
            count,
            entries,
            ids,
        })
    }

    fn write_with_xmp(&self, data: &[u8], out: &mut Vec<u8>, id: u32) -> Result<(), EncoderFailure> {
        let pos = begin_box(out, b"iinf");
        write_full_box(out, self.version, self.flags);
        let count = self.count + 1;
        if self.version == 0 {
            let count = u16::try_from(count).map_err(|_| layout("too many items for iinf v0"))?;
            write_u16(out, count);
        } else {
            write_u32(out, count);
        }
        out.extend_from_slice(&data[self.entries.clone()]);
        write_xmp_infe(out, id)?;
        end_box(out, pos)
    }
}

fn write_xmp_infe(out: &mut Vec<u8>, id: u32) -> Result<(), EncoderFailure> {
    let pos = begin_box(out, b"infe");
    match u16::try_from(id) {
        Ok(id) => {
            write_full_box(out, 2, 0);
            write_u16(out, id);
        }
        Err(_) => {
            write_full_box(out, 3, 0);
            write_u32(out, id);
        }
    }
    // item_protection_index
    write_u16(out, 0);
    out.extend_from_slice(b"mime");
    // empty item_name
    out.push(0);
    out.extend_from_slice(XMP_CONTENT_TYPE.as_bytes());
    out.push(0);
    end_box(out, pos)
}

fn write_iref_with_xmp(
    data: &[u8],
    existing: Option<&BoxHeader>,
    out: &mut Vec<u8>,
    xmp_id: u32,
    primary_id: u32,
) -> Result<(), EncoderFailure> {
    let (version, children) = match existing {
        Some(h) => {
            let mut r = Reader::new(data, h.body());
            let (version, _) = r.full_box()?;
            (version, r.position()..h.end)
        }
        None => {
            let version = u8::from(xmp_id > u32::from(u16::MAX));
            (version, 0..0)
        }
    };
    let wide = version >= 1;

    let pos = begin_box(out, b"iref");
    write_full_box(out, version, 0);
    out.extend_from_slice(&data[children]);
    let cdsc = begin_box(out, b"cdsc");
    write_id(out, xmp_id, wide)?;
    write_u16(out, 1);
    write_id(out, primary_id, wide)?;
    end_box(out, cdsc)?;
    end_box(out, pos)
}

/// Chunk offset table entry in the original file.
struct ChunkOffset {
    pos: usize,
    wide: bool,
}

fn collect_chunk_offsets(
    data: &[u8],
    range: Range<usize>,
    out: &mut Vec<ChunkOffset>,
) -> Result<(), EncoderFailure> {
    for b in read_boxes(data, range)? {
        match &b.kind {
            b"moov" | b"trak" | b"mdia" | b"minf" | b"stbl" => {
                collect_chunk_offsets(data, b.body(), out)?;
            }
            b"stco" | b"co64" => {
                let wide = &b.kind == b"co64";
                let mut r = Reader::new(data, b.body());
                r.full_box()?;
                let count = r.u32()?;
                for _ in 0..count {
                    out.push(ChunkOffset {
                        pos: r.position(),
                        wide,
                    });
                    r.bytes(if wide { 8 } else { 4 })?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Return a copy of the AVIF `file` with `xmp` attached to its primary item.
pub fn embed_xmp(file: &[u8], xmp: &[u8]) -> Result<Vec<u8>, EncoderFailure> {
    let top = read_boxes(file, 0..file.len())?;
    let meta = *top
        .iter()
        .find(|b| &b.kind == b"meta")
        .ok_or_else(|| layout("file has no 'meta' box"))?;
    let meta_body = meta.body();
    if meta_body.len() < 4 {
        return Err(layout("'meta' box is truncated"));
    }
    let meta_version_flags = &file[meta_body.start..meta_body.start + 4];
    let children = read_boxes(file, meta_body.start + 4..meta_body.end)?;
    let find = |kind: &[u8; 4]| children.iter().find(|b| &b.kind == kind);

    let primary_id = parse_pitm(
        file,
        find(b"pitm").ok_or_else(|| layout("'meta' box has no 'pitm'"))?,
    )?;
    let iinf_box = find(b"iinf").ok_or_else(|| layout("'meta' box has no 'iinf'"))?;
    let iloc_box = find(b"iloc").ok_or_else(|| layout("'meta' box has no 'iloc'"))?;
    let iref_box = find(b"iref");

    let iinf = ItemInfo::parse(file, iinf_box)?;
    let iloc = ItemLocation::parse(file, iloc_box)?;
    let xmp_id = iinf
        .ids
        .iter()
        .chain(iloc.items.iter().map(|i| &i.id))
        .copied()
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| layout("item id space exhausted"))?;

    let build_meta = |delta: u64, xmp_offset: u64| -> Result<Vec<u8>, EncoderFailure> {
        let mut loc = iloc.clone();
        loc.shift(&meta, delta)?;
        loc.offset_size = loc.offset_size.max(4);
        loc.length_size = loc.length_size.max(4);
        loc.items.push(IlocItem {
            id: xmp_id,
            construction_method: 0,
            data_reference_index: 0,
            base_offset: 0,
            extents: vec![IlocExtent {
                index: 0,
                offset: xmp_offset,
                length: xmp.len() as u64,
            }],
        });

        let mut out = Vec::with_capacity(meta.len() + 128);
        let pos = begin_box(&mut out, b"meta");
        out.extend_from_slice(meta_version_flags);
        for child in &children {
            match &child.kind {
                b"iloc" => loc.write(&mut out)?,
                b"iinf" => {
                    iinf.write_with_xmp(file, &mut out, xmp_id)?;
                    if iref_box.is_none() {
                        write_iref_with_xmp(file, None, &mut out, xmp_id, primary_id)?;
                    }
                }
                b"iref" => write_iref_with_xmp(file, Some(child), &mut out, xmp_id, primary_id)?,
                _ => out.extend_from_slice(&file[child.start..child.end]),
            }
        }
        end_box(&mut out, pos)?;
        Ok(out)
    };

    let sized = build_meta(0, 0)?;
    let delta = sized
        .len()
        .checked_sub(meta.len())
        .ok_or_else(|| layout("rewritten 'meta' box shrank"))?;
    let xmp_offset = file.len() + delta + 8;
    let new_meta = build_meta(delta as u64, xmp_offset as u64)?;

    let mut out = Vec::with_capacity(xmp_offset + xmp.len());
    for b in &top {
        if b.start == meta.start {
            out.extend_from_slice(&new_meta);
        } else if b.to_eof {
            let size = u32::try_from(b.len())
                .map_err(|_| layout("open-ended box too large to close"))?;
            write_u32(&mut out, size);
            out.extend_from_slice(&b.kind);
            out.extend_from_slice(&file[b.start + 8..b.end]);
        } else {
            out.extend_from_slice(&file[b.start..b.end]);
        }
    }

    let mut offsets = Vec::new();
    for b in top.iter().filter(|b| &b.kind == b"moov") {
        collect_chunk_offsets(file, b.start..b.end, &mut offsets)?;
    }
    for entry in offsets {
        patch_chunk_offset(file, &mut out, &meta, entry, delta)?;
    }

    let mdat_size =
        u32::try_from(8 + xmp.len()).map_err(|_| layout("XMP block too large for 'mdat'"))?;
    write_u32(&mut out, mdat_size);
    out.extend_from_slice(b"mdat");
    out.extend_from_slice(xmp);
    Ok(out)
}

fn patch_chunk_offset(
    file: &[u8],
    out: &mut [u8],
    meta: &BoxHeader,
    entry: ChunkOffset,
    delta: usize,
) -> Result<(), EncoderFailure> {
    let width = if entry.wide { 8 } else { 4 };
    let mut r = Reader::new(file, entry.pos..entry.pos + width);
    let value = r.uint(width as u8)?;
    if value >= meta.start as u64 && value < meta.end as u64 {
        return Err(layout("chunk offset points inside the meta box"));
    }
    if value < meta.end as u64 {
        return Ok(());
    }
    let shifted = value + delta as u64;
    let pos = if entry.pos >= meta.end {
        entry.pos + delta
    } else {
        entry.pos
    };
    if entry.wide {
        out[pos..pos + 8].copy_from_slice(&shifted.to_be_bytes());
    } else {
        let shifted = u32::try_from(shifted).map_err(|_| layout("chunk offset overflows stco"))?;
        out[pos..pos + 4].copy_from_slice(&shifted.to_be_bytes());
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/isobmff.rs"]
mod tests;

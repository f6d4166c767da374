use super::*;

const PAYLOAD: &[u8] = b"FRAM";
const XMP: &[u8] = b"<x:xmpmeta>payload</x:xmpmeta>";

struct Sample {
    bytes: Vec<u8>,
}

/// Build a minimal AVIF-shaped file: ftyp, meta, moov (one stco), mdat.
fn sample(with_iref: bool, mdat_to_eof: bool) -> Sample {
    let mut out = Vec::new();

    let ftyp = begin_box(&mut out, b"ftyp");
    out.extend_from_slice(b"avis");
    write_u32(&mut out, 0);
    out.extend_from_slice(b"avifavismif1miaf");
    end_box(&mut out, ftyp).unwrap();

    let meta = begin_box(&mut out, b"meta");
    write_full_box(&mut out, 0, 0);

    let hdlr = begin_box(&mut out, b"hdlr");
    write_full_box(&mut out, 0, 0);
    write_u32(&mut out, 0);
    out.extend_from_slice(b"pict");
    out.extend_from_slice(&[0; 12]);
    out.push(0);
    end_box(&mut out, hdlr).unwrap();

    let pitm = begin_box(&mut out, b"pitm");
    write_full_box(&mut out, 0, 0);
    write_u16(&mut out, 1);
    end_box(&mut out, pitm).unwrap();

    let iloc = begin_box(&mut out, b"iloc");
    write_full_box(&mut out, 0, 0);
    out.push(0x44);
    out.push(0x00);
    write_u16(&mut out, 1);
    write_u16(&mut out, 1);
    write_u16(&mut out, 0);
    write_u16(&mut out, 1);
    let iloc_offset_pos = out.len();
    write_u32(&mut out, 0);
    write_u32(&mut out, PAYLOAD.len() as u32);
    end_box(&mut out, iloc).unwrap();

    let iinf = begin_box(&mut out, b"iinf");
    write_full_box(&mut out, 0, 0);
    write_u16(&mut out, 1);
    let infe = begin_box(&mut out, b"infe");
    write_full_box(&mut out, 2, 0);
    write_u16(&mut out, 1);
    write_u16(&mut out, 0);
    out.extend_from_slice(b"av01");
    out.push(0);
    end_box(&mut out, infe).unwrap();
    end_box(&mut out, iinf).unwrap();

    if with_iref {
        let iref = begin_box(&mut out, b"iref");
        write_full_box(&mut out, 0, 0);
        let auxl = begin_box(&mut out, b"auxl");
        write_u16(&mut out, 1);
        write_u16(&mut out, 1);
        write_u16(&mut out, 1);
        end_box(&mut out, auxl).unwrap();
        end_box(&mut out, iref).unwrap();
    }
    end_box(&mut out, meta).unwrap();

    let moov = begin_box(&mut out, b"moov");
    let trak = begin_box(&mut out, b"trak");
    let mdia = begin_box(&mut out, b"mdia");
    let minf = begin_box(&mut out, b"minf");
    let stbl = begin_box(&mut out, b"stbl");
    let stco = begin_box(&mut out, b"stco");
    write_full_box(&mut out, 0, 0);
    write_u32(&mut out, 1);
    let stco_pos = out.len();
    write_u32(&mut out, 0);
    for pos in [stco, stbl, minf, mdia, trak, moov] {
        end_box(&mut out, pos).unwrap();
    }

    let mdat = begin_box(&mut out, b"mdat");
    let payload_pos = out.len() as u32;
    out.extend_from_slice(PAYLOAD);
    if mdat_to_eof {
        out[mdat..mdat + 4].copy_from_slice(&0u32.to_be_bytes());
    } else {
        end_box(&mut out, mdat).unwrap();
    }

    out[iloc_offset_pos..iloc_offset_pos + 4].copy_from_slice(&payload_pos.to_be_bytes());
    out[stco_pos..stco_pos + 4].copy_from_slice(&payload_pos.to_be_bytes());
    Sample { bytes: out }
}

fn child(data: &[u8], parent: Range<usize>, kind: &[u8; 4]) -> BoxHeader {
    read_boxes(data, parent)
        .unwrap()
        .into_iter()
        .find(|b| &b.kind == kind)
        .unwrap_or_else(|| panic!("missing box {}", fourcc(kind)))
}

fn meta_children(data: &[u8]) -> Range<usize> {
    let meta = child(data, 0..data.len(), b"meta");
    meta.body().start + 4..meta.end
}

fn item_bytes<'a>(data: &'a [u8], loc: &ItemLocation, id: u32) -> &'a [u8] {
    let item = loc.items.iter().find(|i| i.id == id).unwrap();
    let e = item.extents[0];
    let start = (item.base_offset + e.offset) as usize;
    &data[start..start + e.length as usize]
}

fn stco_target(data: &[u8]) -> u32 {
    let mut offsets = Vec::new();
    let moov = child(data, 0..data.len(), b"moov");
    collect_chunk_offsets(data, moov.start..moov.end, &mut offsets).unwrap();
    assert_eq!(offsets.len(), 1);
    let mut r = Reader::new(data, offsets[0].pos..offsets[0].pos + 4);
    r.u32().unwrap()
}

#[test]
fn sample_is_self_consistent() {
    let s = sample(false, false);
    let loc = ItemLocation::parse(&s.bytes, &child(&s.bytes, meta_children(&s.bytes), b"iloc"))
        .unwrap();
    assert_eq!(item_bytes(&s.bytes, &loc, 1), PAYLOAD);
    let target = stco_target(&s.bytes) as usize;
    assert_eq!(&s.bytes[target..target + 4], PAYLOAD);
}

#[test]
fn embed_appends_item_and_shifts_offsets() {
    let s = sample(false, false);
    let out = embed_xmp(&s.bytes, XMP).unwrap();

    let kinds: Vec<[u8; 4]> = read_boxes(&out, 0..out.len())
        .unwrap()
        .iter()
        .map(|b| b.kind)
        .collect();
    assert_eq!(kinds, vec![*b"ftyp", *b"meta", *b"moov", *b"mdat", *b"mdat"]);
    assert!(out.ends_with(XMP));

    let children = meta_children(&out);
    let loc = ItemLocation::parse(&out, &child(&out, children.clone(), b"iloc")).unwrap();
    assert_eq!(loc.items.len(), 2);
    assert_eq!(item_bytes(&out, &loc, 1), PAYLOAD);
    assert_eq!(item_bytes(&out, &loc, 2), XMP);

    let target = stco_target(&out) as usize;
    assert_eq!(&out[target..target + 4], PAYLOAD);
}

#[test]
fn embed_declares_mime_item_and_cdsc_reference() {
    let s = sample(false, false);
    let out = embed_xmp(&s.bytes, XMP).unwrap();
    let children = meta_children(&out);

    let iinf = ItemInfo::parse(&out, &child(&out, children.clone(), b"iinf")).unwrap();
    assert_eq!(iinf.count, 2);
    assert_eq!(iinf.ids, vec![1, 2]);

    let infes = read_boxes(&out, iinf.entries.clone()).unwrap();
    let xmp_infe = &out[infes[1].body()];
    assert_eq!(&xmp_infe[8..12], b"mime");
    let content_type = &xmp_infe[13..13 + XMP_CONTENT_TYPE.len()];
    assert_eq!(content_type, XMP_CONTENT_TYPE.as_bytes());

    let iref = child(&out, children, b"iref");
    let cdsc = child(&out, iref.body().start + 4..iref.end, b"cdsc");
    assert_eq!(&out[cdsc.body()], &[0, 2, 0, 1, 0, 1]);
}

#[test]
fn embed_keeps_existing_references() {
    let s = sample(true, false);
    let out = embed_xmp(&s.bytes, XMP).unwrap();
    let iref = child(&out, meta_children(&out), b"iref");
    let kinds: Vec<[u8; 4]> = read_boxes(&out, iref.body().start + 4..iref.end)
        .unwrap()
        .iter()
        .map(|b| b.kind)
        .collect();
    assert_eq!(kinds, vec![*b"auxl", *b"cdsc"]);

    let irefs = read_boxes(&out, meta_children(&out))
        .unwrap()
        .iter()
        .filter(|b| &b.kind == b"iref")
        .count();
    assert_eq!(irefs, 1);
}

#[test]
fn embed_closes_open_ended_mdat() {
    let s = sample(false, true);
    let out = embed_xmp(&s.bytes, XMP).unwrap();
    let top = read_boxes(&out, 0..out.len()).unwrap();
    assert_eq!(top.len(), 5);
    assert!(!top[3].to_eof);
    assert_eq!(&out[top[3].body()], PAYLOAD);
    assert_eq!(&out[top[4].body()], XMP);
}

#[test]
fn embed_rejects_files_without_meta() {
    let mut out = Vec::new();
    let ftyp = begin_box(&mut out, b"ftyp");
    out.extend_from_slice(b"avis");
    end_box(&mut out, ftyp).unwrap();
    let err = embed_xmp(&out, XMP).unwrap_err();
    assert_eq!(err.kind, EncoderFailureKind::UnsupportedLayout);
}

#[test]
fn read_boxes_rejects_overruns() {
    let mut data = Vec::new();
    write_u32(&mut data, 64);
    data.extend_from_slice(b"free");
    assert!(read_boxes(&data, 0..data.len()).is_err());
}

#[test]
fn read_boxes_understands_large_size() {
    let mut data = Vec::new();
    write_u32(&mut data, 1);
    data.extend_from_slice(b"free");
    data.extend_from_slice(&20u64.to_be_bytes());
    data.extend_from_slice(&[7; 4]);
    let boxes = read_boxes(&data, 0..data.len()).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].header_len, 16);
    assert_eq!(&data[boxes[0].body()], &[7; 4]);
}

#[test]
fn iloc_v1_with_base_offsets_survives_rewrite() {
    let loc = ItemLocation {
        version: 1,
        flags: 0,
        offset_size: 4,
        length_size: 4,
        base_offset_size: 8,
        index_size: 4,
        items: vec![IlocItem {
            id: 7,
            construction_method: 1,
            data_reference_index: 0,
            base_offset: 1 << 33,
            extents: vec![IlocExtent {
                index: 2,
                offset: 10,
                length: 20,
            }],
        }],
    };
    let mut out = Vec::new();
    loc.write(&mut out).unwrap();
    let header = read_boxes(&out, 0..out.len()).unwrap()[0];
    assert_eq!(ItemLocation::parse(&out, &header).unwrap(), loc);
}

#[test]
fn shift_moves_base_offset_once_per_item() {
    let meta = BoxHeader {
        kind: *b"meta",
        start: 10,
        header_len: 8,
        end: 100,
        to_eof: false,
    };
    let mut loc = ItemLocation {
        version: 1,
        flags: 0,
        offset_size: 4,
        length_size: 4,
        base_offset_size: 4,
        index_size: 0,
        items: vec![
            IlocItem {
                id: 1,
                construction_method: 0,
                data_reference_index: 0,
                base_offset: 200,
                extents: vec![
                    IlocExtent {
                        index: 0,
                        offset: 0,
                        length: 4,
                    },
                    IlocExtent {
                        index: 0,
                        offset: 4,
                        length: 4,
                    },
                ],
            },
            IlocItem {
                id: 2,
                construction_method: 1,
                data_reference_index: 0,
                base_offset: 0,
                extents: vec![IlocExtent {
                    index: 0,
                    offset: 3,
                    length: 1,
                }],
            },
        ],
    };
    loc.shift(&meta, 16).unwrap();
    assert_eq!(loc.items[0].base_offset, 216);
    assert_eq!(loc.items[0].extents[1].offset, 4);
    assert_eq!(loc.items[1].extents[0].offset, 3);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn box_sizes_beyond_32_bits_are_rejected() {
    assert_eq!(box_size(u32::MAX as usize).unwrap(), u32::MAX);
    let err = box_size(u32::MAX as usize + 1).unwrap_err();
    assert_eq!(err.kind, EncoderFailureKind::UnsupportedLayout);
}

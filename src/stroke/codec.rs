//! Binary (de)serialization of the `.lines` stroke format, versions 3 and
//! 5. A direct translation of `remfmt_parse`/`remfmt_render_rm5`
//! (`remfmt.c`) into manual little-endian reads/writes — the same idiom
//! the pack's `nervusdb-v2-storage` pager uses for its own page format,
//! rather than a parser-combinator crate this tiny format doesn't need.

use std::io::{Read, Write};

use super::{Color, Pen, Segment, Stroke, StrokeSet};

const HEADER_LEN: usize = 43;
const HEADER_PREFIX: &str = "reMarkable .lines file, version=";

fn read_u32(r: &mut impl Read) -> Option<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).ok()?;
    Some(u32::from_le_bytes(buf))
}

fn read_f32(r: &mut impl Read) -> Option<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).ok()?;
    Some(f32::from_le_bytes(buf))
}

fn read_segment(r: &mut impl Read) -> Option<Segment> {
    Some(Segment {
        x: read_f32(r)?,
        y: read_f32(r)?,
        speed: read_f32(r)?,
        tilt: read_f32(r)?,
        width: read_f32(r)?,
        pressure: read_f32(r)?,
    })
}

/// Parse a `.lines` stream. Returns `None` on magic mismatch or an
/// unsupported version (3/5 only); a short read while walking strokes or
/// segments aborts that inner sequence without failing the whole parse —
/// everything parsed so far is kept.
pub fn parse(r: &mut impl Read) -> Option<StrokeSet> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header).ok()?;
    let header = String::from_utf8_lossy(&header);
    let version_digit = header.strip_prefix(HEADER_PREFIX)?.chars().next()?;
    let version = version_digit.to_digit(10)?;
    if version != 3 && version != 5 {
        return None;
    }

    let num_layers = read_u32(r)?;
    if num_layers < 1 {
        return None;
    }

    let mut strokes = Vec::new();
    for layer in 0..num_layers {
        let Some(num_strokes) = read_u32(r) else { break };

        for _ in 0..num_strokes {
            let pen = read_u32(r);
            let color = read_u32(r);
            let unk1 = read_f32(r);
            let width = read_f32(r);
            let unk2 = if version == 5 { read_f32(r) } else { Some(0.0) };
            let segment_count = read_u32(r);

            let (Some(pen), Some(color), Some(unk1), Some(width), Some(unk2), Some(segment_count)) =
                (pen, color, unk1, width, unk2, segment_count)
            else {
                break;
            };

            let mut segments = Vec::with_capacity(segment_count as usize);
            for _ in 0..segment_count {
                match read_segment(r) {
                    Some(segment) => segments.push(segment),
                    None => break,
                }
            }

            strokes.push(Stroke {
                layer,
                pen: Pen::from_code(pen),
                color: Color::from_code(color),
                unk1,
                unk2,
                width,
                segments,
            });
        }
    }

    Some(StrokeSet { version, strokes })
}

/// Re-encode a stroke set as a v5 stream. The layer count is derived from
/// the maximum layer index among the strokes (matching the original's
/// `kv_A(*strokes, strokes->n - 1).layer + 1`), and — mirroring a known
/// quirk in the original emitter — the full stroke list is written under
/// *every* layer header rather than partitioned per layer. An empty
/// stroke set encodes nothing beyond the header and a zero layer count.
pub fn encode_v5(strokes: &StrokeSet, w: &mut impl Write) -> std::io::Result<()> {
    let mut header = format!("{HEADER_PREFIX}5");
    header.push_str(&" ".repeat(HEADER_LEN - header.len()));
    w.write_all(header.as_bytes())?;

    let num_layers = strokes.strokes.last().map(|s| s.layer + 1).unwrap_or(0);
    w.write_all(&num_layers.to_le_bytes())?;

    for _ in 0..num_layers {
        w.write_all(&(strokes.strokes.len() as u32).to_le_bytes())?;
        for stroke in &strokes.strokes {
            w.write_all(&stroke.pen.code().to_le_bytes())?;
            w.write_all(&stroke.color.code().to_le_bytes())?;
            w.write_all(&stroke.unk1.to_le_bytes())?;
            w.write_all(&stroke.width.to_le_bytes())?;
            w.write_all(&stroke.unk2.to_le_bytes())?;
            w.write_all(&(stroke.segments.len() as u32).to_le_bytes())?;
            for segment in &stroke.segments {
                w.write_all(&segment.x.to_le_bytes())?;
                w.write_all(&segment.y.to_le_bytes())?;
                w.write_all(&segment.speed.to_le_bytes())?;
                w.write_all(&segment.tilt.to_le_bytes())?;
                w.write_all(&segment.width.to_le_bytes())?;
                w.write_all(&segment.pressure.to_le_bytes())?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn single_layer_single_stroke() -> StrokeSet {
        StrokeSet {
            version: 5,
            strokes: vec![Stroke {
                layer: 0,
                pen: Pen::Highlighter,
                color: Color::Black,
                unk1: 0.0,
                unk2: 0.0,
                width: 2.0,
                segments: vec![
                    Segment { x: 0.0, y: 0.0, speed: 0.0, tilt: 0.0, width: 2.0, pressure: 1.0 },
                    Segment { x: 1.0, y: 1.0, speed: 0.0, tilt: 0.0, width: 2.0, pressure: 1.0 },
                ],
            }],
        }
    }

    #[test]
    fn round_trip_single_layer() {
        let strokes = single_layer_single_stroke();
        let mut buf = Vec::new();
        encode_v5(&strokes, &mut buf).unwrap();

        let parsed = parse(&mut Cursor::new(&buf)).expect("parses back");
        assert_eq!(parsed.version, 5);
        assert_eq!(parsed.strokes, strokes.strokes);

        let mut reencoded = Vec::new();
        encode_v5(&parsed, &mut reencoded).unwrap();
        assert_eq!(buf, reencoded);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 64];
        assert!(parse(&mut Cursor::new(&buf)).is_none());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut header = format!("{HEADER_PREFIX}4");
        header.push_str(&" ".repeat(HEADER_LEN - header.len()));
        assert!(parse(&mut Cursor::new(header.as_bytes())).is_none());
    }

    #[test]
    fn short_read_keeps_already_parsed_strokes() {
        let strokes = single_layer_single_stroke();
        let mut buf = Vec::new();
        encode_v5(&strokes, &mut buf).unwrap();
        buf.truncate(buf.len() - 4); // chop the last segment's pressure field

        let parsed = parse(&mut Cursor::new(&buf)).expect("still parses");
        assert_eq!(parsed.strokes.len(), 1);
        assert_eq!(parsed.strokes[0].segments.len(), 1);
    }

    #[test]
    fn empty_stroke_set_encodes_zero_layers() {
        let strokes = StrokeSet { version: 5, strokes: vec![] };
        let mut buf = Vec::new();
        encode_v5(&strokes, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 4);
        assert_eq!(&buf[HEADER_LEN..], &0u32.to_le_bytes());
    }
}

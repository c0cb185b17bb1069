//! Black-box test of the packer against three small hand-built images,
//! mirroring the way `multilink`'s original test programs assembled the
//! same source at three base addresses and diffed the results.

use relo6502::format::Header;
use relo6502::reloc;

/// Builds a minimal object: header, then `LDA abs` referencing a
/// zero-page operand, then `STA abs` referencing a text-segment operand.
/// `zp_operand` and `text_operand` stand in for the same two symbols
/// assembled at a particular base; varying them between the three
/// images is what a real assembler run would do when the zero-page or
/// text base address changes.
fn image(zp_operand: u16, text_operand: u16) -> Vec<u8> {
    let header = Header { zp_usage: 1, tpa_pages: 1, text_usage: Header::SIZE as u16 + 6 };
    let mut bytes = header.to_bytes().to_vec();
    bytes.push(0xAD); // LDA abs
    bytes.extend_from_slice(&zp_operand.to_le_bytes());
    bytes.push(0x8D); // STA abs
    bytes.extend_from_slice(&text_operand.to_le_bytes());
    bytes
}

#[test]
fn diffs_three_images_into_relocation_streams() {
    // core: zp operand at 0x0010, text operand at 0x1000.
    let core = image(0x0010, 0x1000);
    // zp: only the zero-page base changed, to 0x0020.
    let zp = image(0x0020, 0x1000);
    // mem: only the text base changed, by +2, to 0x1002.
    let mem = image(0x0010, 0x1002);

    let packed = multilink::pack::pack(&core, &zp, &mem).unwrap();

    let code = &packed.object[Header::SIZE..Header::SIZE + 6];
    // The zp-differing byte is untouched (canonicalisation only applies
    // to mem differences); the text operand's low byte is canonicalised
    // back by subtracting 2.
    assert_eq!(code, &[0xAD, 0x10, 0x00, 0x8D, 0xFE, 0x10]);

    // zp operand low byte is at offset Header::SIZE + 1.
    let zp_marks = reloc::decode(&reloc::encode(&[Header::SIZE as u16 + 1]));
    assert_eq!(zp_marks, vec![Header::SIZE as u16 + 1]);

    // text operand low byte is at offset Header::SIZE + 4.
    let text_marks = reloc::decode(&reloc::encode(&[Header::SIZE as u16 + 4]));
    assert_eq!(text_marks, vec![Header::SIZE as u16 + 4]);

    let zp_stream = reloc::encode(&[Header::SIZE as u16 + 1]);
    let text_stream = reloc::encode(&[Header::SIZE as u16 + 4]);
    let tail = &packed.object[Header::SIZE + 6..];
    assert_eq!(tail, [zp_stream, text_stream].concat());
}

#[test]
fn patches_tpa_pages_to_cover_trailing_relocation_data() {
    let mut core = image(0x0010, 0x1000);
    core[1] = 0; // tpa_pages understates the requirement before patching
    let packed = multilink::pack::pack(&core, &core, &core).unwrap();
    // text_usage (13) + the two 1-byte terminator-only streams round up
    // to a single page, which exceeds the original understated value.
    assert_eq!(packed.object[1], 1);
}

#[test]
fn rejects_images_of_different_sizes() {
    let core = image(0x0010, 0x1000);
    let mut mem = core.clone();
    mem.push(0);
    let err = multilink::pack::pack(&core, &core, &mem).unwrap_err();
    assert!(err.to_string().contains("mem"));
}

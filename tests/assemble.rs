//! Black-box tests that assemble small complete programs and check the
//! resulting object file and symbol listing end to end.

use relo6502::format::Header;

fn object_code(source: &str) -> Vec<u8> {
    let out = relo6502::assemble(source, None).unwrap();
    out.object[Header::SIZE..].to_vec()
}

#[test]
fn header_reports_zero_page_and_text_usage() {
    let out = relo6502::assemble(".zp x, 2\nlda #1\nsta x\n", None).unwrap();
    let header = Header::from_bytes(&out.object).unwrap();
    assert_eq!(header.zp_usage, 2);
    // text_usage is the final PC, not a byte count: START_ADDRESS (7) +
    // LDA #1 (2 bytes) + STA zp (2 bytes, shrunk from absolute).
    assert_eq!(header.text_usage, 11);
    assert_eq!(&out.object[4..7], &[0x4C, 0x00, 0x00]);
}

#[test]
fn bss_symbols_are_placed_after_text_in_the_listing() {
    let out = relo6502::assemble(".bss buf, 4\nstart: lda #0\n", None).unwrap();
    let listing = String::from_utf8(out.listing).unwrap();
    // `start` is 2 bytes of text at address 7; `buf` sits right after it.
    assert!(listing.contains("T 0007 start\r\n"));
    assert!(listing.contains("B 0009 buf\r\n"));
}

#[test]
fn forward_and_backward_references_to_the_same_label_agree() {
    let code = object_code("jmp skip\nskip: rts\n");
    assert_eq!(code, &[0x4C, 0x0A, 0x00, 0x60]);
}

#[test]
fn zloop_with_nested_zif_assembles_structured_control() {
    // loop { if cc { break } } -- exercises nested scopes and the
    // break/continue label wiring together.
    let code = object_code("zloop\nzif cc\nzbreak\nzendif\nzcontinue\nzendloop\n");
    // zif cc -> BCS (inverse of cc, 2 bytes) past the body
    assert_eq!(code[0], 0xB0);
    // zbreak (unconditional) -> JMP to the break label
    assert_eq!(code[2], 0x4C);
    // zcontinue (unconditional) -> JMP to the continue (top) label
    assert_eq!(code[5], 0x4C);
    // zendloop -> JMP back to the top
    assert_eq!(code[8], 0x4C);
}

#[test]
fn out_of_range_branch_expands_to_long_form_by_default() {
    let mut source = String::from("top: nop\n");
    for _ in 0..200 {
        source.push_str("nop\n");
    }
    source.push_str("bne top\n");
    let code = object_code(&source);
    // The long form is a reverse-condition short branch over a JMP.
    assert_eq!(&code[code.len() - 5..code.len() - 3], &[0xF0, 0x03]);
    assert_eq!(code[code.len() - 3], 0x4C);
}

#[test]
fn out_of_range_branch_is_an_error_when_expansion_is_disabled() {
    let mut source = String::from(".expand 0\ntop: nop\n");
    for _ in 0..200 {
        source.push_str("nop\n");
    }
    source.push_str("bne top\n");
    let err = relo6502::assemble(&source, None).unwrap_err();
    assert_eq!(err.kind(), relo6502::ErrorKind::Placement);
}

#[test]
fn duplicate_symbol_definition_is_rejected() {
    let err = relo6502::assemble("x: nop\nx: nop\n", None).unwrap_err();
    assert_eq!(err.kind(), relo6502::ErrorKind::Semantic);
}

#[test]
fn reference_to_an_undefined_symbol_is_batched_and_reported() {
    let err = relo6502::assemble("lda undefined_one\nlda undefined_two\n", None).unwrap_err();
    assert_eq!(err.kind(), relo6502::ErrorKind::Unresolved);
    let names: Vec<&str> = err.unresolved().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["undefined_one", "undefined_two"]);
}

#[test]
fn relocation_streams_round_trip_through_the_shared_codec() {
    let out = relo6502::assemble("foo: lda foo\nsta foo\n", None).unwrap();
    // Both instructions resolve to absolute mode (foo is a text-segment
    // label, never zero page), so only the text stream carries marks:
    // the mandatory leading mark at 3, then the last byte of each operand.
    let expected_text_marks = vec![3u16, 9, 12];
    let expected_zp_stream = relo6502::reloc::encode(&[]);
    let expected_text_stream = relo6502::reloc::encode(&expected_text_marks);
    let tail = &out.object[Header::SIZE + 6..];
    assert_eq!(tail, [expected_zp_stream, expected_text_stream].concat());
    assert_eq!(relo6502::reloc::decode(&expected_text_stream), expected_text_marks);
}

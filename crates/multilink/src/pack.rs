//! Derives relocation streams from three base-address variants of the
//! same assembled image and packs them into a single relocatable
//! object, following the scheme `multilink` uses: rather than trusting
//! the assembler's own symbolic relocation streams, it assembles the
//! same program three times at three different base addresses and
//! recovers the relocation map from the raw byte-level differences
//! between the images. This is independent of (and more exhaustive
//! than) the assembler's own per-symbol bookkeeping in [`relo6502::emit`].

use relo6502::format::Header;
use relo6502::reloc;

/// The constant byte subtracted from a core-image byte whose `mem`
/// counterpart differs, canonicalising it back to the address space the
/// `core` image was assembled at. This is the address-space offset
/// between the `core` and `mem` base addresses used to produce the
/// three input images.
const MEM_CANONICALISATION_OFFSET: u8 = 2;

#[derive(Debug, PartialEq, Eq)]
pub enum PackError {
    SizeMismatch { name: &'static str, core_len: usize, other_len: usize },
    HeaderTooShort,
}

impl std::fmt::Display for PackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackError::SizeMismatch { name, core_len, other_len } => write!(
                f,
                "core image is {} bytes but {} image is {} bytes; they must be the same program assembled at different base addresses",
                core_len, name, other_len
            ),
            PackError::HeaderTooShort => write!(f, "core image is shorter than the object header"),
        }
    }
}

impl std::error::Error for PackError {}

/// Byte positions at which `a` and `b` differ.
fn compare(a: &[u8], b: &[u8]) -> Vec<u16> {
    a.iter().zip(b).enumerate().filter(|(_, (x, y))| x != y).map(|(pos, _)| pos as u16).collect()
}

/// The packed object and the size of each of its three regions, for
/// `--verbose` reporting.
#[derive(Debug)]
pub struct Packed {
    pub object: Vec<u8>,
    pub code_len: usize,
    pub zp_relocation_len: usize,
    pub text_relocation_len: usize,
}

/// Diff `core` against `zp` and `mem`, and produce the combined
/// relocatable object: `core`'s bytes (with `mem`-differing positions
/// canonicalised), the TPA header byte patched to account for the
/// trailing relocation data, then the zero-page and text relocation
/// streams.
pub fn pack(core: &[u8], zp: &[u8], mem: &[u8]) -> Result<Packed, PackError> {
    if core.len() != zp.len() {
        return Err(PackError::SizeMismatch { name: "zp", core_len: core.len(), other_len: zp.len() });
    }
    if core.len() != mem.len() {
        return Err(PackError::SizeMismatch { name: "mem", core_len: core.len(), other_len: mem.len() });
    }
    if core.len() < Header::SIZE {
        return Err(PackError::HeaderTooShort);
    }

    let zp_differences = compare(core, zp);
    let zp_bytes = reloc::encode(&zp_differences);
    let mem_differences = compare(core, mem);
    let mem_bytes = reloc::encode(&mem_differences);

    // The `+ 1` here is a margin folded into the TPA size calculation
    // only; no separator byte is written between the two streams.
    let relocation_bytes_size = zp_bytes.len() + 1 + mem_bytes.len();

    let mut object = core.to_vec();
    for &pos in &mem_differences {
        let byte = &mut object[pos as usize];
        *byte = byte.wrapping_sub(MEM_CANONICALISATION_OFFSET);
    }

    let header = Header::from_bytes(&object).expect("length already checked above");
    let tpa_required = header.tpa_pages.max(Header::pages_for(header.text_usage, relocation_bytes_size));
    object[1] = tpa_required;

    object.extend_from_slice(&zp_bytes);
    object.extend_from_slice(&mem_bytes);

    Ok(Packed {
        code_len: core.len() - Header::SIZE,
        zp_relocation_len: zp_bytes.len(),
        text_relocation_len: mem_bytes.len(),
        object,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_with_operand(operand: u16) -> Vec<u8> {
        let header = Header { zp_usage: 0, tpa_pages: 1, text_usage: 3 };
        let mut bytes = header.to_bytes().to_vec();
        bytes.push(0xAD); // LDA abs
        bytes.extend_from_slice(&operand.to_le_bytes());
        bytes
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let core = object_with_operand(0x0100);
        let mut zp = core.clone();
        zp.push(0);
        assert_eq!(pack(&core, &zp, &core), Err(PackError::SizeMismatch { name: "zp", core_len: core.len(), other_len: zp.len() }));
    }

    #[test]
    fn canonicalises_mem_differences_by_subtracting_two() {
        // Same program assembled at base 0x0100 (core) and 0x0102 (mem):
        // the absolute operand differs by exactly 2, and every byte
        // where they differ is written as the core byte minus 2.
        let core = object_with_operand(0x0100);
        let mem = object_with_operand(0x0102);
        let packed = pack(&core, &core, &mem).unwrap();
        let code = &packed.object[Header::SIZE..Header::SIZE + 3];
        assert_eq!(code, &[0xAD, 0xFE, 0x01]);
    }

    #[test]
    fn no_differences_yields_empty_streams_with_terminators_only() {
        let core = object_with_operand(0x0100);
        let packed = pack(&core, &core, &core).unwrap();
        assert_eq!(packed.zp_relocation_len, 1);
        assert_eq!(packed.text_relocation_len, 1);
        assert_eq!(&packed.object[packed.object.len() - 2..], &[0xF0, 0xF0]);
    }
}

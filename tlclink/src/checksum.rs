/// precomputes the checksum table as a constant!
///
/// The controller's table is the reflected 0x1021 table, seeded with zero and
/// without a final xor, i.e. the KERMIT variant.
static CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_KERMIT);

/// Running checksum that can be fed a frame in pieces
pub(crate) struct Checksum {
    digest: crc::Digest<'static, u16>,
}

impl Checksum {
    pub(crate) fn new() -> Self {
        Self {
            digest: CRC.digest(),
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub(crate) fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

/// Compute the checksum of a complete byte sequence
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}

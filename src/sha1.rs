//! Single-purpose streaming SHA-1 (RFC 3174).
//!
//! This hasher exists for exactly one job: deriving the
//! `Sec-WebSocket-Accept` value during the opening handshake. As per
//! RFC 6455 §10.8 that usage "doesn't depend on any security properties
//! of SHA-1, such as collision resistance". Do not use it anywhere such
//! properties matter.

const BLOCK_LEN: usize = 64;

/// Streaming SHA-1 state. Messages are limited to what a 32-bit byte
/// counter can express, far beyond the few hundred bytes hashed here.
pub(crate) struct Sha1 {
    state: [u32; 5],
    block: [u8; BLOCK_LEN],
    block_len: usize,
    bytes_hashed: u32,
}

impl Sha1 {
    pub(crate) fn new() -> Self {
        Self {
            state: [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0],
            block: [0; BLOCK_LEN],
            block_len: 0,
            bytes_hashed: 0,
        }
    }

    /// Feeds `data` into the hash.
    pub(crate) fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.bytes_hashed = self.bytes_hashed.wrapping_add(1);
            self.push(byte);
        }
    }

    /// Pads the final block and returns the 20-byte digest.
    pub(crate) fn finalize(mut self) -> [u8; 20] {
        let bit_len = u64::from(self.bytes_hashed) * 8;

        self.push(0x80);
        while self.block_len != BLOCK_LEN - 8 {
            self.push(0x00);
        }
        for byte in bit_len.to_be_bytes() {
            self.push(byte);
        }
        debug_assert_eq!(self.block_len, 0);

        let mut digest = [0u8; 20];
        for (chunk, word) in digest.chunks_exact_mut(4).zip(self.state) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        digest
    }

    fn push(&mut self, byte: u8) {
        self.block[self.block_len] = byte;
        self.block_len += 1;
        if self.block_len == BLOCK_LEN {
            self.compress();
            self.block_len = 0;
        }
    }

    fn compress(&mut self) {
        let mut w = [0u32; 16];
        for (word, chunk) in w.iter_mut().zip(self.block.chunks_exact(4)) {
            *word = u32::from_be_bytes(chunk.try_into().expect("4-byte chunk"));
        }

        let [mut a, mut b, mut c, mut d, mut e] = self.state;
        for i in 0..80 {
            if i >= 16 {
                let t = w[(i + 13) & 15] ^ w[(i + 8) & 15] ^ w[(i + 2) & 15] ^ w[i & 15];
                w[i & 15] = t.rotate_left(1);
            }

            let f = match i {
                0..=19 => (d ^ (b & (c ^ d))).wrapping_add(0x5A827999),
                20..=39 => (b ^ c ^ d).wrapping_add(0x6ED9EBA1),
                40..=59 => ((b & c) | (d & (b | c))).wrapping_add(0x8F1BBCDC),
                _ => (b ^ c ^ d).wrapping_add(0xCA62C1D6),
            };

            let t = f
                .wrapping_add(a.rotate_left(5))
                .wrapping_add(e)
                .wrapping_add(w[i & 15]);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = t;
        }

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
        self.state[4] = self.state[4].wrapping_add(e);
    }
}

#[cfg(test)]
mod tests {
    use super::Sha1;

    fn hex(digest: [u8; 20]) -> String {
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn digest_of(data: &[u8]) -> String {
        let mut sha1 = Sha1::new();
        sha1.update(data);
        hex(sha1.finalize())
    }

    #[test]
    fn empty_message() {
        assert_eq!(digest_of(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn nist_abc() {
        assert_eq!(digest_of(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn nist_two_block_message() {
        assert_eq!(
            digest_of(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"),
            "84983e441c3bd26ebaae4aa1f95129e5e54670f1"
        );
    }

    #[test]
    fn exactly_one_block() {
        // 64 bytes forces the length padding into a second block.
        assert_eq!(
            digest_of(&[b'a'; 64]),
            "0098ba824b5c16427bd7a1122a5a442a25ec644d"
        );
    }

    #[test]
    fn chunked_updates_match_single_update() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut chunked = Sha1::new();
        for piece in data.chunks(7) {
            chunked.update(piece);
        }
        assert_eq!(hex(chunked.finalize()), digest_of(data));
    }
}

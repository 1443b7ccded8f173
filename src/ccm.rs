//! AES-CCM authenticated encryption (counter mode + CBC-MAC).
//!
//! Mesh direct messages are sealed with CCM using an 8-byte tag and a
//! 13-byte nonce. The engine here is a complete CCM construction over the
//! AES block function: B0/flags formatting, AAD folding, CBC-MAC, and the
//! A_i counter blocks. Only the block function comes from the `aes` crate.
//!
//! Block layouts (L = 15 - nonce size):
//! - B0:  \[flags\] \[nonce\] \[message length, L bytes big-endian\]
//! - A_i: \[L-1\]   \[nonce\] \[i, L bytes big-endian\]
//!
//! The flags byte is `aad? << 6 | ((tag - 2) / 2) << 3 | (L - 1)`.
//! A_0 masks the tag, A_1.. produce the payload keystream.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::types::{CcmError, BLOCK_SIZE, NONCE_SIZE, TAG_SIZE};

/// AAD of this length or more needs the long length encoding, which the
/// mesh never produces.
const MAX_AAD_SIZE: usize = 0xff00;

/// Flag bit signalling that AAD blocks follow B0.
const AAD_FLAG: u8 = 0x40;

/// AES keyed for a single operation, sized by the key.
pub(crate) enum BlockCipher {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl BlockCipher {
    /// Key the block function: 16 bytes selects AES-128, 32 bytes AES-256.
    pub(crate) fn new(key: &[u8]) -> Result<Self, CcmError> {
        let invalid = |_| {
            CcmError::InvalidParameters(format!("cipher key rejected ({} bytes)", key.len()))
        };
        match key.len() {
            16 => Aes128::new_from_slice(key)
                .map(BlockCipher::Aes128)
                .map_err(invalid),
            32 => Aes256::new_from_slice(key)
                .map(BlockCipher::Aes256)
                .map_err(invalid),
            n => Err(CcmError::InvalidParameters(format!(
                "cipher key must be 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// Encrypt one block in place.
    pub(crate) fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            BlockCipher::Aes128(cipher) => cipher.encrypt_block(block),
            BlockCipher::Aes256(cipher) => cipher.encrypt_block(block),
        }
    }
}

/// A CCM instance bound to one key, tag size and nonce size.
///
/// Stateless across calls: every [`Ccm::open`] / [`Ccm::seal`] is independent.
pub struct Ccm {
    cipher: BlockCipher,
    tag_size: usize,
    nonce_size: usize,
}

impl Ccm {
    /// Create a CCM engine.
    ///
    /// # Arguments
    /// * `key` - AES key (16 or 32 bytes)
    /// * `tag_size` - Tag length: even, between 4 and 16
    /// * `nonce_size` - Nonce length: between 7 and 13
    pub fn new(key: &[u8], tag_size: usize, nonce_size: usize) -> Result<Self, CcmError> {
        if !(7..=13).contains(&nonce_size) {
            return Err(CcmError::InvalidParameters(format!(
                "nonce size must be 7..=13, got {}",
                nonce_size
            )));
        }
        if !(4..=16).contains(&tag_size) || tag_size % 2 != 0 {
            return Err(CcmError::InvalidParameters(format!(
                "tag size must be even and 4..=16, got {}",
                tag_size
            )));
        }

        Ok(Self {
            cipher: BlockCipher::new(key)?,
            tag_size,
            nonce_size,
        })
    }

    /// Create the engine with the mesh parameters (8-byte tag, 13-byte nonce).
    pub fn for_mesh(key: &[u8]) -> Result<Self, CcmError> {
        Self::new(key, TAG_SIZE, NONCE_SIZE)
    }

    /// Tag length produced and expected by this engine.
    pub fn tag_size(&self) -> usize {
        self.tag_size
    }

    /// Nonce length expected by this engine.
    pub fn nonce_size(&self) -> usize {
        self.nonce_size
    }

    /// Decrypt `ciphertext` and verify `tag` over the plaintext and `aad`.
    ///
    /// Nothing derived from the ciphertext is returned unless the tag matches.
    pub fn open(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CcmError> {
        self.check_nonce(nonce)?;
        if tag.len() != self.tag_size {
            return Err(CcmError::InvalidInput(format!(
                "tag must be {} bytes, got {}",
                self.tag_size,
                tag.len()
            )));
        }
        if ciphertext.is_empty() {
            return Err(CcmError::InvalidInput("empty ciphertext".into()));
        }
        self.check_lengths(ciphertext.len(), aad)?;

        let mut plaintext = ciphertext.to_vec();
        self.apply_keystream(nonce, &mut plaintext);

        let mut expected = self.cbc_mac(nonce, &plaintext, aad);
        self.mask_tag(nonce, &mut expected);
        let matches: bool = expected[..self.tag_size].ct_eq(tag).into();
        expected.zeroize();

        if !matches {
            plaintext.zeroize();
            return Err(CcmError::AuthenticationFailed);
        }

        Ok(plaintext)
    }

    /// Encrypt `plaintext` and authenticate it together with `aad`.
    ///
    /// # Returns
    /// `ciphertext || tag`
    pub fn seal(&self, nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CcmError> {
        self.check_nonce(nonce)?;
        self.check_lengths(plaintext.len(), aad)?;

        let mut tag = self.cbc_mac(nonce, plaintext, aad);
        self.mask_tag(nonce, &mut tag);

        let mut sealed = Vec::with_capacity(plaintext.len() + self.tag_size);
        sealed.extend_from_slice(plaintext);
        self.apply_keystream(nonce, &mut sealed);
        sealed.extend_from_slice(&tag[..self.tag_size]);
        tag.zeroize();

        Ok(sealed)
    }

    fn length_size(&self) -> usize {
        15 - self.nonce_size
    }

    fn check_nonce(&self, nonce: &[u8]) -> Result<(), CcmError> {
        if nonce.len() != self.nonce_size {
            return Err(CcmError::InvalidInput(format!(
                "nonce must be {} bytes, got {}",
                self.nonce_size,
                nonce.len()
            )));
        }
        Ok(())
    }

    fn check_lengths(&self, message_len: usize, aad: &[u8]) -> Result<(), CcmError> {
        if aad.len() >= MAX_AAD_SIZE {
            return Err(CcmError::InvalidInput(format!(
                "AAD too long: {} bytes",
                aad.len()
            )));
        }
        let length_bits = 8 * self.length_size();
        if length_bits < 64 && (message_len as u64) >> length_bits != 0 {
            return Err(CcmError::InvalidInput(format!(
                "message of {} bytes does not fit a {}-byte length field",
                message_len,
                self.length_size()
            )));
        }
        Ok(())
    }

    /// Block carrying `nonce` and a big-endian value in the trailing L bytes.
    fn nonce_block(&self, first: u8, nonce: &[u8], value: u64) -> [u8; BLOCK_SIZE] {
        let l = self.length_size();
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = first;
        block[1..1 + self.nonce_size].copy_from_slice(nonce);
        block[BLOCK_SIZE - l..].copy_from_slice(&value.to_be_bytes()[8 - l..]);
        block
    }

    fn counter_block(&self, nonce: &[u8], counter: u64) -> [u8; BLOCK_SIZE] {
        self.nonce_block((self.length_size() - 1) as u8, nonce, counter)
    }

    fn apply_keystream(&self, nonce: &[u8], data: &mut [u8]) {
        for (index, chunk) in data.chunks_mut(BLOCK_SIZE).enumerate() {
            let mut keystream = self.counter_block(nonce, index as u64 + 1);
            self.cipher.encrypt_block(&mut keystream);
            for (byte, key) in chunk.iter_mut().zip(keystream.iter()) {
                *byte ^= key;
            }
            keystream.zeroize();
        }
    }

    fn mask_tag(&self, nonce: &[u8], mac: &mut [u8; BLOCK_SIZE]) {
        let mut s0 = self.counter_block(nonce, 0);
        self.cipher.encrypt_block(&mut s0);
        for (byte, key) in mac.iter_mut().zip(s0.iter()) {
            *byte ^= key;
        }
    }

    fn flags(&self, has_aad: bool) -> u8 {
        let aad = if has_aad { AAD_FLAG } else { 0 };
        let tag = (((self.tag_size - 2) / 2) as u8) << 3;
        aad | tag | (self.length_size() - 1) as u8
    }

    /// Raw CBC-MAC over B0, the encoded AAD, then the plaintext.
    fn cbc_mac(&self, nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> [u8; BLOCK_SIZE] {
        let mut mac = self.nonce_block(self.flags(!aad.is_empty()), nonce, plaintext.len() as u64);
        self.cipher.encrypt_block(&mut mac);

        if !aad.is_empty() {
            let mut header = Vec::with_capacity(2 + aad.len());
            header.extend_from_slice(&(aad.len() as u16).to_be_bytes());
            header.extend_from_slice(aad);
            self.absorb(&mut mac, &header);
        }
        self.absorb(&mut mac, plaintext);

        mac
    }

    /// Fold `data` into the MAC block by block; the last block is zero padded.
    fn absorb(&self, mac: &mut [u8; BLOCK_SIZE], data: &[u8]) {
        for chunk in data.chunks(BLOCK_SIZE) {
            for (byte, input) in mac.iter_mut().zip(chunk.iter()) {
                *byte ^= input;
            }
            self.cipher.encrypt_block(mac);
        }
    }
}

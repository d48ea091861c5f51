//! AES-256-CBC value encryption.
//!
//! Output layout is `iv ‖ ciphertext` with a fresh random 16-byte IV and
//! PKCS#7 padding.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::AppStateError;

/// Size of the CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt under a random IV and prepend the IV.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, AppStateError> {
    let mut iv = [0u8; IV_SIZE];
    getrandom::getrandom(&mut iv).map_err(|e| AppStateError::Encryption(e.to_string()))?;
    encrypt_with_iv(key, &iv, plaintext)
}

fn encrypt_with_iv(
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, AppStateError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| AppStateError::Encryption(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `iv ‖ ciphertext`.
pub fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, AppStateError> {
    if data.len() < IV_SIZE * 2 || data.len() % IV_SIZE != 0 {
        return Err(AppStateError::Decryption(format!(
            "ciphertext length {} is not a whole number of blocks after the IV",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(IV_SIZE);
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| AppStateError::Decryption(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| AppStateError::Decryption("invalid padding".into()))
}

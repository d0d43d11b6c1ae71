//! Wallet addresses.
//!
//! `frg_` + base32(public key) + base32(first 5 bytes of Blake2b-256(public
//! key)), using the alphabet `13456789abcdefghijkmnopqrstuwxyz`. Addresses
//! are 64 characters long. The engine only derives them; parsing untrusted
//! addresses happens before transactions reach it.

use forge_types::{Address, PublicKey};

const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";
const CHECKSUM_LEN: usize = 5;

/// Base32 over `bytes`, zero-padding the final group on the right.
fn base32(bytes: &[u8], out: &mut String) {
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &byte in bytes {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((acc >> bits) & 0x1F) as usize] as char);
        }
        acc &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(ALPHABET[((acc << (5 - bits)) & 0x1F) as usize] as char);
    }
}

/// The address of the wallet owning `public_key`.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let checksum = crate::blake2b_256(public_key.as_bytes());
    let mut address = String::with_capacity(Address::PREFIX.len() + 60);
    address.push_str(Address::PREFIX);
    base32(public_key.as_bytes(), &mut address);
    base32(&checksum[..CHECKSUM_LEN], &mut address);
    Address::new(address)
}

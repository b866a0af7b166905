use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::constants::{NONCE_SIZE, TAG_SIZE};

type HmacSha1 = Hmac<Sha1>;

pub type Nonce = [u8; NONCE_SIZE];
pub type Tag = [u8; TAG_SIZE];

pub fn generate_nonce(rng: &mut dyn RngCore) -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);
    nonce
}

fn mac(secret: &[u8], data: &[u8]) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(secret).ok()?;
    mac.update(data);
    Some(mac)
}

/// First TAG_SIZE bytes of HMAC-SHA1(secret, data), or `None` if the
/// secret cannot key the MAC.
pub fn sign(secret: &[u8], data: &[u8]) -> Option<Tag> {
    let digest = mac(secret, data)?.finalize().into_bytes();
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&digest[..TAG_SIZE]);
    Some(tag)
}

/// Constant-time check of a truncated tag.
pub fn verify(secret: &[u8], data: &[u8], tag: &[u8]) -> bool {
    if tag.len() != TAG_SIZE {
        return false;
    }
    mac(secret, data).is_some_and(|mac| mac.verify_truncated_left(tag).is_ok())
}

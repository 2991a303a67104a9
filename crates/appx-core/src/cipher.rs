//! Streaming AES-256-CBC transport encryption
//!
//! Encrypted files are laid out as `[16-byte IV][ciphertext]`. The input is
//! processed in 8192-byte chunks, each encrypted as its own CBC run whose IV
//! is the last ciphertext block of the previous chunk, which makes the whole
//! stream equivalent to a single CBC pass. Only the final chunk is padded.
//!
//! The padding is not PKCS#7: an input whose length is already a multiple
//! of 16 gets no padding at all instead of a full extra block. Decryption
//! strips a trailing pad only when the last byte is in `1..=16`, without
//! checking the pad bytes. There is no integrity protection.
//!
//! The final chunk is found by looking ahead, so it is unpadded even when
//! it is a full 8192 bytes. A plaintext whose length is a multiple of 16
//! and whose last byte is in `0x01..=0x10` therefore loses that many
//! trailing bytes on decryption, at any length.

use crate::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;
/// Cipher block length in bytes
pub const BLOCK_LEN: usize = 16;
/// Size of the chunks the stream is processed in
pub const CHUNK_SIZE: usize = 8192;

/// Raw 256-bit key material
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Use `bytes` as key material; fails unless it is exactly 32 bytes
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKey(bytes.len()))?;
        Ok(Self(key))
    }

    /// Read key material from a file holding exactly 32 bytes
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("Key file does not exist: {:?}", path)));
        }
        Self::new(&fs::read(path)?)
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key([redacted])")
    }
}

/// CBC chaining value carried from one chunk to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainState([u8; BLOCK_LEN]);

impl ChainState {
    /// Fresh random IV for a new stream
    pub fn random() -> Self {
        let mut iv = [0u8; BLOCK_LEN];
        OsRng.fill_bytes(&mut iv);
        Self(iv)
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_LEN] {
        &self.0
    }

    /// Chaining value following `ciphertext` (its last block)
    fn following(ciphertext: &[u8]) -> Self {
        let mut iv = [0u8; BLOCK_LEN];
        iv.copy_from_slice(&ciphertext[ciphertext.len() - BLOCK_LEN..]);
        Self(iv)
    }
}

impl From<[u8; BLOCK_LEN]> for ChainState {
    fn from(iv: [u8; BLOCK_LEN]) -> Self {
        Self(iv)
    }
}

/// Number of pad bytes appended to a final chunk of `len` bytes
///
/// Zero when `len` is already block aligned.
pub fn padding_len(len: usize) -> usize {
    match len % BLOCK_LEN {
        0 => 0,
        rem => BLOCK_LEN - rem,
    }
}

/// Strip the trailing pad from a decrypted final chunk
///
/// The pad length is taken from the last byte and honored when it is in
/// `1..=16` and fits the data; the pad bytes themselves are not checked.
pub fn unpad(plain: &[u8]) -> &[u8] {
    match plain.last() {
        Some(&pad) if (1..=BLOCK_LEN as u8).contains(&pad) && pad as usize <= plain.len() => {
            &plain[..plain.len() - pad as usize]
        }
        _ => plain,
    }
}

/// Encrypt one block-aligned chunk in place
///
/// Returns the chaining value for the next chunk: the last ciphertext block.
pub fn encrypt_chunk(key: &Key, state: ChainState, chunk: &mut [u8]) -> Result<ChainState> {
    let len = ensure_aligned(chunk)?;
    if len == 0 {
        return Ok(state);
    }

    Aes256CbcEnc::new_from_slices(key.as_bytes(), state.as_bytes())
        .map_err(|e| Error::Crypto(format!("Failed to import key: {}", e)))?
        .encrypt_padded_mut::<NoPadding>(chunk, len)
        .map_err(|_| Error::Crypto("Chunk encryption failed".to_string()))?;

    Ok(ChainState::following(chunk))
}

/// Decrypt one block-aligned chunk in place
///
/// Returns the chaining value for the next chunk, which is the last block
/// of the ciphertext that was passed in, not of the plaintext produced.
pub fn decrypt_chunk(key: &Key, state: ChainState, chunk: &mut [u8]) -> Result<ChainState> {
    let len = ensure_aligned(chunk)?;
    if len == 0 {
        return Ok(state);
    }
    let next = ChainState::following(chunk);

    Aes256CbcDec::new_from_slices(key.as_bytes(), state.as_bytes())
        .map_err(|e| Error::Crypto(format!("Failed to import key: {}", e)))?
        .decrypt_padded_mut::<NoPadding>(chunk)
        .map_err(|_| Error::Crypto("Chunk decryption failed".to_string()))?;

    Ok(next)
}

fn ensure_aligned(chunk: &[u8]) -> Result<usize> {
    if chunk.len() % BLOCK_LEN != 0 {
        return Err(Error::Crypto(format!(
            "Ciphertext is not a multiple of {} bytes ({} bytes in chunk)",
            BLOCK_LEN,
            chunk.len()
        )));
    }
    Ok(chunk.len())
}

/// Encrypt `reader` into `writer` under a fresh random IV
///
/// Returns the number of bytes written, IV included.
pub fn encrypt_stream<R: Read, W: Write>(key: &Key, reader: R, writer: &mut W) -> Result<u64> {
    encrypt_stream_with_iv(key, ChainState::random(), reader, writer)
}

/// Encrypt `reader` into `writer` starting from a caller-chosen IV
pub fn encrypt_stream_with_iv<R: Read, W: Write>(
    key: &Key,
    iv: ChainState,
    mut reader: R,
    writer: &mut W,
) -> Result<u64> {
    writer.write_all(iv.as_bytes())?;
    let mut written = BLOCK_LEN as u64;

    let mut state = iv;
    let mut buf = vec![0u8; CHUNK_SIZE + BLOCK_LEN];

    loop {
        let read = read_full(&mut reader, &mut buf[..CHUNK_SIZE])?;
        if read == 0 {
            break;
        }

        let is_final = read < CHUNK_SIZE;
        let mut len = read;
        if is_final {
            let pad = padding_len(read);
            buf[read..read + pad].fill(pad as u8);
            len += pad;
        }

        state = encrypt_chunk(key, state, &mut buf[..len])?;
        writer.write_all(&buf[..len])?;
        written += len as u64;

        if is_final {
            break;
        }
    }

    writer.flush()?;
    Ok(written)
}

/// Decrypt `reader` into `writer`
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(key: &Key, reader: R, writer: &mut W) -> Result<u64> {
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, reader);

    let mut iv = [0u8; BLOCK_LEN];
    if read_full(&mut reader, &mut iv)? < BLOCK_LEN {
        return Err(Error::Crypto(
            "Missing IV: encrypted input is shorter than 16 bytes".to_string(),
        ));
    }

    let mut state = ChainState::from(iv);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let read = read_full(&mut reader, &mut buf)?;
        if read == 0 {
            break;
        }

        // Padding can fill the last chunk exactly, so finality is decided by lookahead
        let is_final = reader.fill_buf()?.is_empty();

        state = decrypt_chunk(key, state, &mut buf[..read])?;
        let plain = if is_final { unpad(&buf[..read]) } else { &buf[..read] };
        writer.write_all(plain)?;
        written += plain.len() as u64;

        if is_final {
            break;
        }
    }

    writer.flush()?;
    Ok(written)
}

/// Encrypt the file at `source` into `dest`
///
/// The key is checked before anything is opened. On failure the partially
/// written destination is left in place.
pub fn encrypt_file<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q, key: &[u8]) -> Result<u64> {
    let key = Key::new(key)?;
    let (source, dest) = (source.as_ref(), dest.as_ref());
    info!("Encrypting {:?} -> {:?}", source, dest);

    let (reader, mut writer) = open_pair(source, dest)?;
    let written = encrypt_stream(&key, reader, &mut writer).map_err(|e| partial(dest, e))?;

    debug!("Wrote {} encrypted bytes to {:?}", written, dest);
    Ok(written)
}

/// Decrypt the file at `source` into `dest`
///
/// The key is checked before anything is opened. On failure the partially
/// written destination is left in place.
pub fn decrypt_file<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q, key: &[u8]) -> Result<u64> {
    let key = Key::new(key)?;
    let (source, dest) = (source.as_ref(), dest.as_ref());
    info!("Decrypting {:?} -> {:?}", source, dest);

    let (reader, mut writer) = open_pair(source, dest)?;
    let written = decrypt_stream(&key, reader, &mut writer).map_err(|e| partial(dest, e))?;

    debug!("Wrote {} decrypted bytes to {:?}", written, dest);
    Ok(written)
}

fn open_pair(source: &Path, dest: &Path) -> Result<(File, BufWriter<File>)> {
    if !source.exists() {
        return Err(Error::NotFound(format!(
            "Source file does not exist: {:?}",
            source
        )));
    }

    let reader = File::open(source)?;
    let writer = File::create(dest).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("Failed to create output file {:?}: {}", dest, e),
        ))
    })?;

    Ok((reader, BufWriter::with_capacity(CHUNK_SIZE, writer)))
}

fn partial(dest: &Path, err: Error) -> Error {
    warn!("Cipher aborted, partial output left at {:?}: {}", dest, err);
    err
}

/// Fill `buf` from `reader`, stopping early only at end of input
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

    // Letters only, so the last byte never looks like a pad length
    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| b'a' + (i % 26) as u8).collect()
    }

    fn encrypt_vec(data: &[u8], iv: ChainState) -> Vec<u8> {
        let mut out = Vec::new();
        encrypt_stream_with_iv(&Key::new(&KEY).unwrap(), iv, Cursor::new(data), &mut out).unwrap();
        out
    }

    fn decrypt_vec(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        decrypt_stream(&Key::new(&KEY).unwrap(), Cursor::new(data), &mut out).unwrap();
        out
    }

    #[test]
    fn test_padding_len() {
        assert_eq!(padding_len(0), 0);
        assert_eq!(padding_len(1), 15);
        assert_eq!(padding_len(15), 1);
        assert_eq!(padding_len(16), 0);
        assert_eq!(padding_len(17), 15);
    }

    #[test]
    fn test_unpad() {
        assert_eq!(unpad(&[b'x', 3, 3, 3]), &[b'x']);
        assert_eq!(unpad(&[b'x', b'y']), &[b'x', b'y']);
        assert_eq!(unpad(&[0u8; 4]), &[0u8; 4]);
        // Pad bytes are not verified
        assert_eq!(unpad(&[b'x', 9, 2]), &[b'x']);
        // Pad longer than the data is ignored
        assert_eq!(unpad(&[5, 5]), &[5, 5]);
    }

    #[test]
    fn test_ciphertext_sizes() {
        let iv = ChainState::from([1u8; BLOCK_LEN]);
        assert_eq!(encrypt_vec(&sample(0), iv).len(), 16);
        assert_eq!(encrypt_vec(&sample(1), iv).len(), 32);
        assert_eq!(encrypt_vec(&sample(16), iv).len(), 32);
        assert_eq!(encrypt_vec(&sample(17), iv).len(), 48);
        assert_eq!(encrypt_vec(&sample(8192), iv).len(), 16 + 8192);
        assert_eq!(encrypt_vec(&sample(8193), iv).len(), 16 + 8192 + 16);
    }

    #[test]
    fn test_round_trip_boundary_lengths() {
        for len in [0usize, 1, 15, 16, 17, 8190, 8192, 8193, 3 * 8192 + 5] {
            let data = sample(len);
            let encrypted = encrypt_vec(&data, ChainState::random());
            assert_eq!(decrypt_vec(&encrypted), data, "length {}", len);
        }
    }

    #[test]
    fn test_iv_is_prefix() {
        let iv = ChainState::from([0xAB; BLOCK_LEN]);
        let encrypted = encrypt_vec(&sample(40), iv);
        assert_eq!(&encrypted[..BLOCK_LEN], iv.as_bytes());
    }

    #[test]
    fn test_chunked_stream_matches_single_cbc_pass() {
        let iv = ChainState::from([3u8; BLOCK_LEN]);
        let data = sample(20_001);
        let chunked = encrypt_vec(&data, iv);

        let mut whole = data.clone();
        whole.resize(data.len() + padding_len(data.len()), padding_len(data.len()) as u8);
        let len = whole.len();
        Aes256CbcEnc::new_from_slices(&KEY, iv.as_bytes())
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut whole, len)
            .unwrap();

        assert_eq!(&chunked[BLOCK_LEN..], &whole[..]);
    }

    #[test]
    fn test_chain_state_threading() {
        let key = Key::new(&KEY).unwrap();
        let iv = ChainState::from([9u8; BLOCK_LEN]);

        let mut chunk = sample(64);
        let after_encrypt = encrypt_chunk(&key, iv, &mut chunk).unwrap();
        assert_eq!(after_encrypt.as_bytes()[..], chunk[48..]);

        let ciphertext = chunk.clone();
        let after_decrypt = decrypt_chunk(&key, iv, &mut chunk).unwrap();
        assert_eq!(after_decrypt.as_bytes()[..], ciphertext[48..]);
        assert_eq!(chunk, sample(64));
    }

    #[test]
    fn test_random_iv_differs() {
        let data = sample(100);
        let a = encrypt_vec(&data, ChainState::random());
        let b = encrypt_vec(&data, ChainState::random());
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_length() {
        assert!(matches!(Key::new(&[0u8; 31]), Err(Error::InvalidKey(31))));
        assert!(matches!(Key::new(&[0u8; 33]), Err(Error::InvalidKey(33))));
        assert!(Key::try_from(&KEY[..]).is_ok());
        assert_eq!(format!("{:?}", Key::generate()), "Key([redacted])");
    }

    #[test]
    fn test_missing_iv() {
        let mut out = Vec::new();
        let err = decrypt_stream(&Key::new(&KEY).unwrap(), Cursor::new(vec![1u8; 5]), &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_misaligned_ciphertext() {
        let mut encrypted = encrypt_vec(&sample(32), ChainState::random());
        encrypted.pop();
        let mut out = Vec::new();
        let err = decrypt_stream(&Key::new(&KEY).unwrap(), Cursor::new(encrypted), &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_invalid_key_checked_before_io() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("missing.bin");
        let dest = temp_dir.path().join("out.enc");

        let err = encrypt_file(&source, &dest, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(16)));
        let err = decrypt_file(&source, &dest, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(0)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let err = encrypt_file(
            temp_dir.path().join("missing.bin"),
            temp_dir.path().join("out.enc"),
            &KEY,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("plain.bin");
        let encrypted = temp_dir.path().join("plain.enc");
        let decrypted = temp_dir.path().join("plain.out");
        fs::write(&plain, sample(10_000_000)).unwrap();

        let written = encrypt_file(&plain, &encrypted, &KEY).unwrap();
        assert_eq!(written, fs::metadata(&encrypted).unwrap().len());
        assert_eq!(written, 16 + 10_000_000 + padding_len(10_000_000) as u64);

        let restored = decrypt_file(&encrypted, &decrypted, &KEY).unwrap();
        assert_eq!(restored, 10_000_000);
        assert_eq!(fs::read(&decrypted).unwrap(), fs::read(&plain).unwrap());
    }

    #[test]
    fn test_key_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.key");
        let bad = temp_dir.path().join("bad.key");
        fs::write(&good, KEY).unwrap();
        fs::write(&bad, b"short").unwrap();

        assert_eq!(Key::from_file(&good).unwrap(), Key::new(&KEY).unwrap());
        assert!(matches!(Key::from_file(&bad), Err(Error::InvalidKey(5))));
        assert!(matches!(
            Key::from_file(temp_dir.path().join("none.key")),
            Err(Error::NotFound(_))
        ));
    }
}

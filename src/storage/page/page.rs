use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};

use crate::storage::page::error::PageError;

/// Width in bytes of the engine's canonical integer: block numbers,
/// transaction numbers, record tags, length prefixes, and the log-block
/// boundary are all big-endian `i32`.
pub const INT_SIZE: usize = 4;

/// Upper bound on the bytes needed to store a string of `strlen`
/// characters: the length prefix plus four bytes per character.
pub fn max_length(strlen: usize) -> usize {
    INT_SIZE + strlen * 4
}

/// A fixed-size byte buffer mirroring one disk block. Pages are the unit
/// of transfer between disk and memory; all multi-byte values are stored
/// big-endian.
///
/// Accessors do not bounds-check: an offset without enough room for the
/// value is a programming error and panics.
#[derive(Debug, Clone)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    /// A zeroed page of the given block size.
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size],
        }
    }

    /// Wrap an existing byte buffer, e.g. a log record.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        BigEndian::read_i32(&self.data[offset..])
    }

    pub fn set_int(&mut self, offset: usize, value: i32) {
        BigEndian::write_i32(&mut self.data[offset..], value);
    }

    pub fn get_long(&self, offset: usize) -> i64 {
        BigEndian::read_i64(&self.data[offset..])
    }

    pub fn set_long(&mut self, offset: usize, value: i64) {
        BigEndian::write_i64(&mut self.data[offset..], value);
    }

    pub fn get_short(&self, offset: usize) -> i16 {
        BigEndian::read_i16(&self.data[offset..])
    }

    pub fn set_short(&mut self, offset: usize, value: i16) {
        BigEndian::write_i16(&mut self.data[offset..], value);
    }

    pub fn get_bool(&self, offset: usize) -> bool {
        self.data[offset] != 0
    }

    pub fn set_bool(&mut self, offset: usize, value: bool) {
        self.data[offset] = value as u8;
    }

    /// Read the length-prefixed byte blob at `offset`.
    pub fn get_bytes(&self, offset: usize) -> Vec<u8> {
        let len = self.get_int(offset) as usize;
        let start = offset + INT_SIZE;
        self.data[start..start + len].to_vec()
    }

    /// Write `bytes` at `offset`, preceded by their length.
    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.set_int(offset, bytes.len() as i32);
        let start = offset + INT_SIZE;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Read the length-prefixed string at `offset`, validating UTF-8.
    pub fn get_string(&self, offset: usize) -> Result<String, PageError> {
        String::from_utf8(self.get_bytes(offset)).map_err(|_| PageError::InvalidUtf8)
    }

    /// Write a string at `offset` as a length-prefixed UTF-8 blob.
    pub fn set_string(&mut self, offset: usize, value: &str) {
        self.set_bytes(offset, value.as_bytes());
    }

    /// Read the 64-bit Unix timestamp at `offset` as a UTC datetime.
    pub fn get_date(&self, offset: usize) -> Result<DateTime<Utc>, PageError> {
        let secs = self.get_long(offset);
        DateTime::from_timestamp(secs, 0).ok_or(PageError::InvalidTimestamp(secs))
    }

    /// Store a datetime at `offset` as whole Unix seconds.
    pub fn set_date(&mut self, offset: usize, value: DateTime<Utc>) {
        self.set_long(offset, value.timestamp());
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn int_round_trip() {
        let mut page = Page::new(400);
        page.set_int(80, 1234);
        page.set_int(84, -1);
        assert_eq!(page.get_int(80), 1234);
        assert_eq!(page.get_int(84), -1);
    }

    #[test]
    fn long_round_trip() {
        let mut page = Page::new(400);
        page.set_long(0, i64::MAX);
        page.set_long(8, i64::MIN);
        assert_eq!(page.get_long(0), i64::MAX);
        assert_eq!(page.get_long(8), i64::MIN);
    }

    #[test]
    fn short_round_trip() {
        let mut page = Page::new(400);
        page.set_short(10, -321);
        assert_eq!(page.get_short(10), -321);
    }

    #[test]
    fn bool_round_trip() {
        let mut page = Page::new(400);
        page.set_bool(0, true);
        page.set_bool(1, false);
        assert!(page.get_bool(0));
        assert!(!page.get_bool(1));
    }

    #[test]
    fn nonzero_byte_reads_as_true() {
        let mut page = Page::new(400);
        page.contents_mut()[5] = 7;
        assert!(page.get_bool(5));
    }

    #[test]
    fn bytes_round_trip() {
        let mut page = Page::new(400);
        let payload = vec![1u8, 2, 3, 250];
        page.set_bytes(100, &payload);
        assert_eq!(page.get_bytes(100), payload);
    }

    #[test]
    fn string_round_trip() {
        let mut page = Page::new(400);
        page.set_string(88, "abcdefghijklm");
        assert_eq!(page.get_string(88).unwrap(), "abcdefghijklm");

        // values can sit back to back when spaced with max_length
        let next = 88 + max_length("abcdefghijklm".len());
        page.set_int(next, 345);
        assert_eq!(page.get_string(88).unwrap(), "abcdefghijklm");
        assert_eq!(page.get_int(next), 345);
    }

    #[test]
    fn multibyte_string_round_trip() {
        let mut page = Page::new(400);
        page.set_string(0, "héllo wörld ≠");
        assert_eq!(page.get_string(0).unwrap(), "héllo wörld ≠");
    }

    #[test]
    fn invalid_utf8_fails() {
        let mut page = Page::new(400);
        page.set_bytes(0, &[0xff, 0xfe, 0xfd]);
        assert!(matches!(page.get_string(0), Err(PageError::InvalidUtf8)));
    }

    #[test]
    fn date_round_trip() {
        let mut page = Page::new(400);
        let date = Utc.with_ymd_and_hms(2021, 7, 30, 12, 30, 45).unwrap();
        page.set_date(16, date);
        assert_eq!(page.get_date(16).unwrap(), date);
    }

    #[test]
    fn fresh_page_is_zeroed() {
        let page = Page::new(128);
        assert_eq!(page.get_int(0), 0);
        assert_eq!(page.get_long(64), 0);
        assert!(!page.get_bool(127));
    }

    #[test]
    fn max_length_accounts_for_prefix() {
        assert_eq!(max_length(0), INT_SIZE);
        assert_eq!(max_length(13), INT_SIZE + 52);
    }
}

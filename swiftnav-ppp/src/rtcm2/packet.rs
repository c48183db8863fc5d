// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! RTCM2 packet framing
//!
//! A packet is two header words followed by a variable number of data words.
//! The assembler scans a retained byte buffer for a word that passes parity
//! and carries the preamble, then reads the rest of the packet. One spare
//! word is always kept ahead of the putative header so the parity history can
//! be reconstructed when synchronization is retried on the same buffer.
//!
//! On any parity failure past the header, a single buffer byte is dropped and
//! the search starts over on the next call; framing errors are never
//! surfaced beyond that.

use log::trace;

use super::word::ThirtyBitWord;

/// Number of transport bytes per 30-bit word
const WORD_LEN: usize = 5;
/// Number of spare words retained for parity resynchronization
const SPARE: usize = 1;

/// An error encountered when a bit field extends past a packet's payload
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("bit field extends past the end of the packet")]
pub struct PacketTooShort;

/// A complete RTCM2 packet with valid parity throughout
///
/// Stores the two sign-corrected header words and the sign-corrected data
/// words. The payload is bit-addressable across the concatenated 24-bit data
/// portions of the data words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    h1: u32,
    h2: u32,
    dw: Vec<u32>,
}

impl Packet {
    /// Message type, 1..=63
    #[must_use]
    pub fn msg_type(&self) -> u16 {
        ((self.h1 >> 16) & 0x3F) as u16
    }

    /// Reference station id
    #[must_use]
    pub fn station_id(&self) -> u16 {
        ((self.h1 >> 6) & 0x3FF) as u16
    }

    /// Modified Z-count, units of 0.6 s
    #[must_use]
    pub fn mod_z_count(&self) -> u32 {
        (self.h2 >> 17) & 0x1FFF
    }

    /// Sequence number
    #[must_use]
    pub fn seq_number(&self) -> u8 {
        ((self.h2 >> 14) & 0x7) as u8
    }

    /// Number of data words following the header
    #[must_use]
    pub fn n_data_words(&self) -> usize {
        ((self.h2 >> 9) & 0x1F) as usize
    }

    /// Reference station health
    #[must_use]
    pub fn sta_health(&self) -> u8 {
        ((self.h2 >> 6) & 0x3) as u8
    }

    /// The i-th sign-corrected data word, or zero when out of range
    #[must_use]
    pub fn data_word(&self, i: usize) -> u32 {
        self.dw.get(i).copied().unwrap_or(0)
    }

    /// Extract an unsigned bit field from the packet payload
    ///
    /// Bits are numbered from the left (msb) starting at bit 0, counting
    /// across the concatenated 24-bit data portions of the data words.
    /// `n` must not exceed 32.
    ///
    /// # Errors
    ///
    /// Fails with [`PacketTooShort`] when the field extends past the payload.
    pub fn get_unsigned_bits(&self, start: usize, n: usize) -> Result<u32, PacketTooShort> {
        assert!(n <= 32, "bit fields wider than 32 bits are not supported");

        if start + n > 24 * self.dw.len() {
            return Err(PacketTooShort);
        }

        let i_first = start / 24;
        let i_last = (start + n - 1) / 24;

        // first data word: strip parity and unwanted leading bits
        let mut tmp = (self.dw[i_first] >> 6) & 0xFF_FFFF;
        tmp = ((tmp << (start % 24)) & 0xFF_FFFF) >> (start % 24);

        let mut bit_field: u32 = 0;
        if i_first < i_last {
            bit_field = tmp;
            for word in &self.dw[i_first + 1..i_last] {
                tmp = (word >> 6) & 0xFF_FFFF;
                bit_field = bit_field.wrapping_shl(24) | tmp;
            }
            tmp = (self.dw[i_last] >> 6) & 0xFF_FFFF;
        }

        // last data word: strip trailing bits
        tmp >>= 23 - (start + n - 1) % 24;
        Ok(bit_field.wrapping_shl(((start + n - 1) % 24 + 1) as u32) | tmp)
    }

    /// Extract a sign-extended bit field from the packet payload
    ///
    /// # Errors
    ///
    /// Fails with [`PacketTooShort`] when the field extends past the payload.
    pub fn get_bits(&self, start: usize, n: usize) -> Result<i32, PacketTooShort> {
        let v = self.get_unsigned_bits(start, n)?;
        Ok((v.wrapping_shl((32 - n) as u32) as i32) >> (32 - n))
    }
}

/// Assembles packets out of a caller-retained byte buffer
///
/// The single word register is kept across calls so parity sign correction
/// stays continuous over consecutive packets.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    word: ThirtyBitWord,
}

impl PacketAssembler {
    /// A fresh assembler with cleared parity history
    #[must_use]
    pub fn new() -> PacketAssembler {
        PacketAssembler::default()
    }

    /// Locate and read the next header word
    ///
    /// The spare word ahead of the candidate is consumed first so the parity
    /// history is in a defined state, then the scan advances byte by byte
    /// until a word passes parity and carries the preamble. Processed bytes
    /// are removed, except for the spare word retained for a later resync.
    fn get_header(&mut self, buf: &mut Vec<u8>) {
        let mut i = 0;
        while i < (SPARE + 1) * WORD_LEN {
            self.word.append(buf[i]);
            i += 1;
        }

        while !self.word.is_header() && i < buf.len() {
            self.word.append(buf[i]);
            i += 1;
        }

        if i >= (1 + SPARE) * WORD_LEN {
            buf.drain(0..i - (1 + SPARE) * WORD_LEN);
        }
    }

    /// Try to frame the next packet out of `buf`
    ///
    /// Consumed bytes are removed from the buffer; on an incomplete packet
    /// the header bytes are retained so the packet completes on a later call
    /// once more data has arrived. Returns `None` when no complete packet
    /// with valid parity is available yet.
    pub fn next_packet(&mut self, buf: &mut Vec<u8>) -> Option<Packet> {
        // need at least the spare word and the first header byte group
        if buf.len() < (SPARE + 1) * WORD_LEN {
            return None;
        }

        self.get_header(buf);
        if !self.word.is_header() {
            return None;
        }
        let h1 = self.word.value();

        if buf.len() < (SPARE + 2) * WORD_LEN {
            return None;
        }
        self.word.get(&buf[(SPARE + 1) * WORD_LEN..]);
        let h2 = self.word.value();
        if !self.word.valid_parity() {
            trace!("parity failure in second header word, resyncing");
            buf.drain(0..1);
            return None;
        }

        let n = ((h2 >> 9) & 0x1F) as usize;
        if buf.len() < (SPARE + 2 + n) * WORD_LEN {
            return None;
        }

        let mut dw = vec![0u32; n];
        for (i, slot) in dw.iter_mut().enumerate() {
            self.word.get(&buf[(SPARE + 2 + i) * WORD_LEN..]);
            *slot = self.word.value();
            if !self.word.valid_parity() {
                trace!("parity failure in data word {}, resyncing", i);
                buf.drain(0..1);
                return None;
            }
        }

        // keep a spare word's worth of bytes for parity resynchronization
        buf.drain(0..(n + 2) * WORD_LEN);

        Some(Packet { h1, h2, dw })
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::super::word::test_utils::encode_word;

    /// Encode a full RTCM2 packet (lead parity chained from `prev`),
    /// returning the transport bytes and the trailing parity history
    pub(crate) fn encode_packet(
        msg_type: u32,
        station_id: u32,
        mod_z_count: u32,
        seq: u32,
        payloads: &[u32],
        prev: u32,
    ) -> (Vec<u8>, u32) {
        let h1 = (0x66 << 16) | ((msg_type & 0x3F) << 10) | (station_id & 0x3FF);
        let h2 = ((mod_z_count & 0x1FFF) << 11) | ((seq & 0x7) << 8) | ((payloads.len() as u32) << 3);

        let mut bytes = Vec::new();
        let mut tail = prev;
        for data in std::iter::once(&h1)
            .chain(std::iter::once(&h2))
            .chain(payloads.iter())
        {
            let (word_bytes, next_tail) = encode_word(*data & 0xFF_FFFF, tail);
            bytes.extend_from_slice(&word_bytes);
            tail = next_tail;
        }
        (bytes, tail)
    }

    /// A lead-in word ahead of the first packet so the header scanner has
    /// its spare word, as on a live stream
    pub(crate) fn lead_in() -> (Vec<u8>, u32) {
        let (bytes, tail) = encode_word(0, 0);
        (bytes.to_vec(), tail)
    }

    /// Pack a sequence of (value, width) fields, msb first, into 24-bit
    /// payload words, zero-padding the tail
    pub(crate) fn pack_bits(fields: &[(u32, usize)]) -> Vec<u32> {
        let mut bits = Vec::new();
        for &(value, width) in fields {
            for i in (0..width).rev() {
                bits.push((value >> i) & 1);
            }
        }
        while bits.len() % 24 != 0 {
            bits.push(0);
        }
        bits.chunks(24)
            .map(|chunk| chunk.iter().fold(0u32, |acc, &b| (acc << 1) | b))
            .collect()
    }
}

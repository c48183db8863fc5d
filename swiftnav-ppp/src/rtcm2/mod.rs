// Copyright (c) 2025 Swift Navigation Inc.
// Contact: Swift Navigation <dev@swiftnav.com>
//
// This source is subject to the license found in the file 'LICENSE' which must
// be be distributed together with this source. All other rights reserved.
//
// THIS CODE AND INFORMATION IS PROVIDED "AS IS" WITHOUT WARRANTY OF ANY KIND,
// EITHER EXPRESSED OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE IMPLIED
// WARRANTIES OF MERCHANTABILITY AND/OR FITNESS FOR A PARTICULAR PURPOSE.
//! Legacy RTCM2 differential GNSS wire format
//!
//! The format transports 30-bit words (24 data bits, 6 parity bits per
//! ICD-GPS-200) in bytes of six payload bits each. This module provides the
//! word layer ([`word`]), packet framing and bit-addressable payload access
//! ([`packet`]), the individual message decoders ([`msg`]) and a stream
//! decoder that produces observation and station records ([`decoder`]).
//!
//! # References
//! * RTCM 10402.3 Recommended Standards for Differential GNSS Service,
//!   Version 2.3, Radio Technical Commission For Maritime Services (2001)
//! * ICD-GPS-200, Navstar GPS Space Segment / Navigation User Interfaces,
//!   Revision C (1997)

pub mod decoder;
pub mod msg;
pub mod packet;
pub mod word;

pub use decoder::{RefPointKind, Rtcm2Decoder, StationRecord};
pub use msg::ObsBlock;
pub use packet::{Packet, PacketAssembler, PacketTooShort};
pub use word::ThirtyBitWord;

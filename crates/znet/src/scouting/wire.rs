// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scouting datagrams.
//!
//! # Format
//!
//! ```text
//! header (1 byte) = message id (low 5 bits) | flags (high 3 bits)
//!
//! SCOUT (0x01)  flags: I=0x20 peer id requested, W=0x40 what present
//!   [what: zint]                     if W (absent means ROUTER)
//!
//! HELLO (0x02)  flags: I=0x20 pid present, W=0x40 whatami present, L=0x80 locators present
//!   [pid: zint len, bytes]           if I
//!   [whatami: zint]                  if W (absent means ROUTER)
//!   [locators: zint count, (zint len, utf8 bytes)*]   if L
//! ```
//!
//! `zint` is an unsigned LEB128 varint.

use crate::error::{Error, Result};
use crate::types::{Hello, PeerId, WhatAmI, PEER_ID_MAX_LEN};

pub const SCOUT_ID: u8 = 0x01;
pub const HELLO_ID: u8 = 0x02;

const ID_MASK: u8 = 0x1f;
const FLAG_I: u8 = 0x20;
const FLAG_W: u8 = 0x40;
const FLAG_L: u8 = 0x80;

/// Longest locator string accepted while decoding.
const MAX_LOCATOR_LEN: usize = 256;
/// Most locators accepted in one hello.
const MAX_LOCATORS: usize = 64;

/// A decoded scouting message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoutingMessage {
    Scout { what: WhatAmI, pid_request: bool },
    Hello(Hello),
}

pub fn encode_scout(what: WhatAmI, pid_request: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    let mut header = SCOUT_ID | FLAG_W;
    if pid_request {
        header |= FLAG_I;
    }
    buf.push(header);
    write_zint(&mut buf, u64::from(what.bits()));
    buf
}

pub fn encode_hello(hello: &Hello) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    let mut header = HELLO_ID;
    if hello.pid.is_some() {
        header |= FLAG_I;
    }
    if hello.whatami != WhatAmI::ROUTER {
        header |= FLAG_W;
    }
    if !hello.locators.is_empty() {
        header |= FLAG_L;
    }
    buf.push(header);

    if let Some(pid) = &hello.pid {
        write_bytes(&mut buf, pid.as_bytes());
    }
    if header & FLAG_W != 0 {
        write_zint(&mut buf, u64::from(hello.whatami.bits()));
    }
    if header & FLAG_L != 0 {
        write_zint(&mut buf, hello.locators.len() as u64);
        for locator in &hello.locators {
            write_bytes(&mut buf, locator.as_bytes());
        }
    }
    buf
}

pub fn decode(buf: &[u8]) -> Result<ScoutingMessage> {
    let mut reader = Reader { buf, pos: 0 };
    let header = reader.u8()?;

    let message = match header & ID_MASK {
        SCOUT_ID => {
            let what = if header & FLAG_W != 0 {
                reader.whatami()?
            } else {
                WhatAmI::ROUTER
            };
            ScoutingMessage::Scout {
                what,
                pid_request: header & FLAG_I != 0,
            }
        }
        HELLO_ID => {
            let pid = if header & FLAG_I != 0 {
                let bytes = reader.bytes()?;
                if bytes.is_empty() || bytes.len() > PEER_ID_MAX_LEN {
                    return Err(Error::MalformedMessage("peer id length"));
                }
                Some(PeerId::from_bytes(bytes))
            } else {
                None
            };
            let whatami = if header & FLAG_W != 0 {
                reader.whatami()?
            } else {
                WhatAmI::ROUTER
            };
            let mut locators = Vec::new();
            if header & FLAG_L != 0 {
                let count = reader.zint()?;
                if count > MAX_LOCATORS as u64 {
                    return Err(Error::MalformedMessage("too many locators"));
                }
                for _ in 0..count {
                    let raw = reader.bytes()?;
                    if raw.len() > MAX_LOCATOR_LEN {
                        return Err(Error::MalformedMessage("locator too long"));
                    }
                    let locator = std::str::from_utf8(raw)
                        .map_err(|_| Error::MalformedMessage("locator is not utf-8"))?;
                    locators.push(locator.to_string());
                }
            }
            ScoutingMessage::Hello(Hello {
                whatami,
                pid,
                locators,
            })
        }
        _ => return Err(Error::MalformedMessage("unknown message id")),
    };

    if reader.pos != buf.len() {
        return Err(Error::MalformedMessage("trailing bytes"));
    }
    Ok(message)
}

fn write_zint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_zint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(Error::MalformedMessage("truncated"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn zint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::MalformedMessage("varint overflow"))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.zint()?)
            .map_err(|_| Error::MalformedMessage("length overflow"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::MalformedMessage("truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn whatami(&mut self) -> Result<WhatAmI> {
        let raw = u32::try_from(self.zint()?)
            .map_err(|_| Error::MalformedMessage("whatami overflow"))?;
        WhatAmI::from_bits(raw)
            .filter(|w| !w.is_empty())
            .ok_or(Error::MalformedMessage("invalid whatami"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scout_encoding() {
        let buf = encode_scout(WhatAmI::ROUTER | WhatAmI::PEER, true);
        assert_eq!(buf, vec![SCOUT_ID | FLAG_W | FLAG_I, 0x03]);
        assert_eq!(
            decode(&buf).expect("decode"),
            ScoutingMessage::Scout {
                what: WhatAmI::ROUTER | WhatAmI::PEER,
                pid_request: true
            }
        );
    }

    #[test]
    fn test_scout_without_what_defaults_to_router() {
        assert_eq!(
            decode(&[SCOUT_ID]).expect("decode"),
            ScoutingMessage::Scout {
                what: WhatAmI::ROUTER,
                pid_request: false
            }
        );
    }

    #[test]
    fn test_hello_with_everything() {
        let hello = Hello {
            whatami: WhatAmI::PEER,
            pid: Some(PeerId::from_bytes(&[0xAB; 16])),
            locators: vec!["tcp/10.0.0.1:7447".into(), "udp/10.0.0.1:7447".into()],
        };
        let buf = encode_hello(&hello);
        assert_eq!(buf[0], HELLO_ID | FLAG_I | FLAG_W | FLAG_L);
        assert_eq!(decode(&buf).expect("decode"), ScoutingMessage::Hello(hello));
    }

    #[test]
    fn test_minimal_router_hello() {
        let hello = Hello {
            whatami: WhatAmI::ROUTER,
            pid: None,
            locators: Vec::new(),
        };
        assert_eq!(encode_hello(&hello), vec![HELLO_ID]);
    }

    #[test]
    fn test_varint_multi_byte() {
        let mut buf = Vec::new();
        write_zint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
        let mut reader = Reader { buf: &buf, pos: 0 };
        assert_eq!(reader.zint().expect("zint"), 300);
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x1f]).is_err());
        // pid length runs past the end
        assert!(decode(&[HELLO_ID | FLAG_I, 0x05, 0x01]).is_err());
        // whatami of zero
        assert!(decode(&[SCOUT_ID | FLAG_W, 0x00]).is_err());
        // trailing garbage
        assert!(decode(&[SCOUT_ID, 0x00]).is_err());
        // unterminated varint
        assert!(decode(&[SCOUT_ID | FLAG_W, 0x80, 0x80]).is_err());
    }
}

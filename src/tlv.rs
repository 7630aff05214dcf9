//! Clock quality TLV (type 0x8001).
//!
//! Fixed 120-byte record, all fields big-endian:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 2    | type = 0x8001                           |
//! | 2      | 2    | length of the payload that follows (116) |
//! | 4      | 1    | version (1)                             |
//! | 5      | 1    | measurement method code                 |
//! | 6      | 1    | flags: accuracy, stability, locked, lock time (bits 0..3) |
//! | 7      | 1    | reserved                                |
//! | 8      | 4    | total measurements                      |
//! | 12     | 4    | consecutive good measurements           |
//! | 16     | 4    | window (s)                              |
//! | 20     | 4    | accuracy requirement (ns)               |
//! | 24     | 8×3  | mean, max, min time error (i64 ns)      |
//! | 48     | 8×5  | std dev, rms, lock time, frequency stability, observation (f64) |
//! | 88     | 32   | profile name, UTF-8, NUL padded         |

use crate::measurement::MeasurementMethod;
use crate::metrics::ClockQualityMetrics;
use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

pub const CLOCK_QUALITY_TLV_TYPE: u16 = 0x8001;
pub const TLV_VERSION: u8 = 1;

const HEADER_LEN: usize = 4;
const NAME_OFFSET: usize = 88;
const NAME_LEN: usize = 32;
pub const PAYLOAD_LEN: usize = NAME_OFFSET + NAME_LEN - HEADER_LEN;
pub const TLV_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

const FLAG_ACCURACY: u8 = 0x01;
const FLAG_STABILITY: u8 = 0x02;
const FLAG_LOCKED: u8 = 0x04;
const FLAG_LOCK_TIME: u8 = 0x08;

/// Contents of one clock quality TLV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTlv {
    pub profile_name: String,
    pub accuracy_requirement_ns: i64,
    pub metrics: ClockQualityMetrics,
}

pub fn encode(tlv: &QualityTlv) -> Vec<u8> {
    let m = &tlv.metrics;
    let mut buf = vec![0u8; TLV_LEN];

    BigEndian::write_u16(&mut buf[0..2], CLOCK_QUALITY_TLV_TYPE);
    BigEndian::write_u16(&mut buf[2..4], PAYLOAD_LEN as u16);

    let mut flags = 0u8;
    if m.meets_80ns_requirement {
        flags |= FLAG_ACCURACY;
    }
    if m.meets_stability_requirement {
        flags |= FLAG_STABILITY;
    }
    if m.is_locked {
        flags |= FLAG_LOCKED;
    }
    if m.meets_lock_time_requirement {
        flags |= FLAG_LOCK_TIME;
    }
    buf[4] = TLV_VERSION;
    buf[5] = m.measurement_method.code();
    buf[6] = flags;

    BigEndian::write_u32(&mut buf[8..12], m.total_measurements);
    BigEndian::write_u32(&mut buf[12..16], m.consecutive_good_measurements);
    BigEndian::write_u32(&mut buf[16..20], m.window_seconds);
    let accuracy = u32::try_from(tlv.accuracy_requirement_ns.max(0)).unwrap_or(u32::MAX);
    BigEndian::write_u32(&mut buf[20..24], accuracy);

    BigEndian::write_i64(&mut buf[24..32], m.mean_time_error_ns);
    BigEndian::write_i64(&mut buf[32..40], m.max_time_error_ns);
    BigEndian::write_i64(&mut buf[40..48], m.min_time_error_ns);

    BigEndian::write_f64(&mut buf[48..56], m.std_dev_ns);
    BigEndian::write_f64(&mut buf[56..64], m.rms_error_ns);
    BigEndian::write_f64(&mut buf[64..72], m.lock_time_seconds);
    BigEndian::write_f64(&mut buf[72..80], m.frequency_stability_ppb);
    BigEndian::write_f64(&mut buf[80..88], m.observation_window_seconds);

    let name = tlv.profile_name.as_str();
    let mut end = name.len().min(NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    buf[NAME_OFFSET..NAME_OFFSET + end].copy_from_slice(&name.as_bytes()[..end]);

    buf
}

/// Parse a TLV produced by [`encode`]. Trailing bytes after the record are ignored.
pub fn decode(bytes: &[u8]) -> Result<QualityTlv> {
    if bytes.len() < HEADER_LEN {
        bail!("TLV too short: {} bytes", bytes.len());
    }
    let tlv_type = BigEndian::read_u16(&bytes[0..2]);
    if tlv_type != CLOCK_QUALITY_TLV_TYPE {
        bail!("unexpected TLV type 0x{:04x}", tlv_type);
    }
    let length = BigEndian::read_u16(&bytes[2..4]) as usize;
    if length != PAYLOAD_LEN {
        bail!("unexpected TLV length {} (expected {})", length, PAYLOAD_LEN);
    }
    if bytes.len() < TLV_LEN {
        bail!("TLV truncated: {} of {} bytes", bytes.len(), TLV_LEN);
    }
    if bytes[4] != TLV_VERSION {
        bail!("unsupported TLV version {}", bytes[4]);
    }

    let method = MeasurementMethod::from_code(bytes[5])?;
    let flags = bytes[6];

    let raw_name = &bytes[NAME_OFFSET..NAME_OFFSET + NAME_LEN];
    let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    let profile_name = std::str::from_utf8(&raw_name[..name_len])
        .context("profile name is not UTF-8")?
        .to_string();

    let metrics = ClockQualityMetrics {
        total_measurements: BigEndian::read_u32(&bytes[8..12]),
        consecutive_good_measurements: BigEndian::read_u32(&bytes[12..16]),
        window_seconds: BigEndian::read_u32(&bytes[16..20]),
        mean_time_error_ns: BigEndian::read_i64(&bytes[24..32]),
        max_time_error_ns: BigEndian::read_i64(&bytes[32..40]),
        min_time_error_ns: BigEndian::read_i64(&bytes[40..48]),
        std_dev_ns: BigEndian::read_f64(&bytes[48..56]),
        rms_error_ns: BigEndian::read_f64(&bytes[56..64]),
        lock_time_seconds: BigEndian::read_f64(&bytes[64..72]),
        frequency_stability_ppb: BigEndian::read_f64(&bytes[72..80]),
        observation_window_seconds: BigEndian::read_f64(&bytes[80..88]),
        meets_80ns_requirement: flags & FLAG_ACCURACY != 0,
        meets_stability_requirement: flags & FLAG_STABILITY != 0,
        is_locked: flags & FLAG_LOCKED != 0,
        meets_lock_time_requirement: flags & FLAG_LOCK_TIME != 0,
        measurement_method: method,
    };

    Ok(QualityTlv {
        profile_name,
        accuracy_requirement_ns: BigEndian::read_u32(&bytes[20..24]) as i64,
        metrics,
    })
}

//! CRC-8 (polynomial x^8 + x^2 + x + 1, initial value 0) used by the
//! VBE state record

const POLY: u8 = 0x07;

pub fn crc8(init: u8, data: &[u8]) -> u8 {
    data.iter().fold(init, |mut crc, &b| {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
        }
        crc
    })
}

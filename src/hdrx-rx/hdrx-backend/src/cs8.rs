// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Widens interleaved cs8 I/Q to cs16 and decimates by an integer factor,
/// averaging each run of `factor` complex samples.
///
/// State carries across calls, so a transfer boundary may fall anywhere,
/// even between the I and Q byte of one sample.
#[derive(Debug, Clone)]
pub struct Cs8Decimator {
    factor: u32,
    acc_i: i32,
    acc_q: i32,
    count: u32,
    pending_i: Option<i8>,
}

impl Cs8Decimator {
    pub fn new(factor: u32) -> Self {
        Self {
            factor: factor.max(1),
            acc_i: 0,
            acc_q: 0,
            count: 0,
            pending_i: None,
        }
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    pub fn reset(&mut self) {
        self.acc_i = 0;
        self.acc_q = 0;
        self.count = 0;
        self.pending_i = None;
    }

    /// Append the decimated cs16 output for `raw` to `out`.
    pub fn process(&mut self, raw: &[u8], out: &mut Vec<i16>) {
        for &byte in raw {
            let value = byte as i8;
            let Some(i) = self.pending_i.take() else {
                self.pending_i = Some(value);
                continue;
            };
            self.acc_i += i32::from(i) << 8;
            self.acc_q += i32::from(value) << 8;
            self.count += 1;
            if self.count == self.factor {
                let n = self.factor as i32;
                out.push((self.acc_i / n) as i16);
                out.push((self.acc_q / n) as i16);
                self.acc_i = 0;
                self.acc_q = 0;
                self.count = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(values: &[i8]) -> Vec<u8> {
        values.iter().map(|&v| v as u8).collect()
    }

    #[test]
    fn factor_one_only_widens() {
        let mut dec = Cs8Decimator::new(1);
        let mut out = Vec::new();
        dec.process(&bytes(&[1, -1, 127, -128]), &mut out);
        assert_eq!(out, vec![256, -256, 32512, -32768]);
    }

    #[test]
    fn averages_runs_of_factor() {
        let mut dec = Cs8Decimator::new(4);
        let mut out = Vec::new();
        dec.process(&bytes(&[4, -4, 8, -8, 12, -12, 16, -16, 1, 1]), &mut out);
        assert_eq!(out, vec![10 << 8, -(10 << 8)]);
    }

    #[test]
    fn split_transfers_match_one_transfer() {
        let raw: Vec<u8> = (0..64u8).map(|v| v.wrapping_mul(37)).collect();
        let mut whole = Vec::new();
        Cs8Decimator::new(4).process(&raw, &mut whole);

        let mut dec = Cs8Decimator::new(4);
        let mut pieces = Vec::new();
        for chunk in raw.chunks(7) {
            dec.process(chunk, &mut pieces);
        }
        assert_eq!(whole, pieces);
        assert_eq!(whole.len(), 8);
    }

    #[test]
    fn reset_drops_partial_state() {
        let mut dec = Cs8Decimator::new(2);
        let mut out = Vec::new();
        dec.process(&bytes(&[100, 100, 100]), &mut out);
        dec.reset();
        dec.process(&bytes(&[2, 2, 2, 2]), &mut out);
        assert_eq!(out, vec![512, 512]);
    }
}

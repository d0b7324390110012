// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Bytes the device transmitted, separated into echoed input and heartbeats.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SplitOutput {
    pub echoed: Vec<u8>,
    pub markers: Vec<u8>,
}

/// Pull the two-byte heartbeats at `offsets` out of `output`.
pub fn split_heartbeats(output: &[u8], offsets: &[u64]) -> SplitOutput {
    let mut split = SplitOutput::default();
    let mut offsets = offsets.iter().map(|&o| o as usize).peekable();
    let mut i = 0;
    while i < output.len() {
        if offsets.peek() == Some(&i) {
            offsets.next();
            split.markers.push(output[i]);
            i += 2;
            continue;
        }
        split.echoed.push(output[i]);
        i += 1;
    }
    split
}

/// Index of the first byte where `expected` and `actual` differ.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    if let Some(i) = expected.iter().zip(actual).position(|(a, b)| a != b) {
        return Some(i);
    }
    (expected.len() != actual.len()).then(|| expected.len().min(actual.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_input_that_looks_like_heartbeat() {
        // input "-\n" echoed with a heartbeat after its first byte
        let output = b"--\n\n";
        let split = split_heartbeats(output, &[1]);
        assert_eq!(split.echoed, b"-\n".to_vec());
        assert_eq!(split.markers, b"-".to_vec());
    }

    #[test]
    fn test_split_trailing_heartbeat() {
        let split = split_heartbeats(b"ab1\n", &[2]);
        assert_eq!(split.echoed, b"ab".to_vec());
        assert_eq!(split.markers, b"1".to_vec());
    }

    #[test]
    fn test_first_mismatch() {
        assert_eq!(first_mismatch(b"abc", b"abc"), None);
        assert_eq!(first_mismatch(b"abc", b"abd"), Some(2));
        assert_eq!(first_mismatch(b"abc", b"ab"), Some(2));
        assert_eq!(first_mismatch(b"", b"x"), Some(0));
    }
}

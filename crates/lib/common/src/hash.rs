// Copyright (C) 2025 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::hash::{Hash, Hasher};

/// 64 bit content key. All cache keys in the codebase go through these so
/// that hashes stay comparable between runs and platforms.
pub fn hash64_bytes(data: &[u8]) -> u64 {
    let mut hasher = siphasher::sip::SipHasher::default();
    hasher.write(data);
    hasher.finish()
}

pub fn hash64<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = siphasher::sip::SipHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        assert_eq!(hash64("some/path.sbsar"), hash64("some/path.sbsar"));
        assert_ne!(hash64("a"), hash64("b"));
    }

    #[test]
    fn bytes_and_str_agree_with_themselves() {
        let data = b"payload".to_vec();
        assert_eq!(hash64_bytes(&data), hash64_bytes(b"payload"));
    }
}

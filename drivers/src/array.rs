/*++

Licensed under the Apache-2.0 license.

File Name:

    array.rs

Abstract:

    Big-endian word views of the byte buffers crossing the CRYP register
    boundary. The accelerator consumes key and initialization-vector words
    most-significant byte first; these types perform the conversion once so
    register writers deal only in words.

--*/

macro_rules! array4 {
    ($dim: literal) => {
        paste::paste! {
             pub const [<ARRAY_4X $dim _BYTE_SIZE>]: usize = $dim * core::mem::size_of::<u32>();
             pub const [<ARRAY_4X $dim _WORD_SIZE>]: usize = $dim;

             #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
             pub struct [<Array4x $dim>](pub [u32; [<ARRAY_4X $dim _WORD_SIZE>]]);

             impl From<[u8; [<ARRAY_4X $dim _BYTE_SIZE>]]> for [<Array4x $dim>] {
                 #[inline(never)]
                 fn from(value: [u8; [<ARRAY_4X $dim _BYTE_SIZE>]]) -> Self {
                     let mut result = [<Array4x $dim>]([0u32; [<ARRAY_4X $dim _WORD_SIZE>]]);

                     for i in 0..[<ARRAY_4X $dim _WORD_SIZE>] {
                         result.0[i] = u32::from_be_bytes(value[i * 4..][..4].try_into().unwrap())
                     }

                     result
                 }
             }

             impl<'a> From<&'a [u8; [<ARRAY_4X $dim _BYTE_SIZE>]]> for [<Array4x $dim>] {
                 #[inline(never)]
                 fn from(value: &'a [u8; [<ARRAY_4X $dim _BYTE_SIZE>]]) -> Self {
                     let mut result = [<Array4x $dim>]([0u32; [<ARRAY_4X $dim _WORD_SIZE>]]);

                     for i in 0..[<ARRAY_4X $dim _WORD_SIZE>] {
                         result.0[i] = u32::from_be_bytes(value[i * 4..][..4].try_into().unwrap())
                     }

                     result
                 }
             }

             impl From<[<Array4x $dim>]> for [u8; [<ARRAY_4X $dim _BYTE_SIZE>]] {
                 #[inline(never)]
                 fn from(value: [<Array4x $dim>]) -> Self {
                     let mut result = [0u8; [<ARRAY_4X $dim _BYTE_SIZE>]];

                     for i in 0..[<ARRAY_4X $dim _WORD_SIZE>] {
                         *<&mut [u8; 4]>::try_from(&mut result[i * 4..][..4]).unwrap() =
                             value.0[i].to_be_bytes();
                     }

                     result
                 }
             }

             impl From<[u32; [<ARRAY_4X $dim _WORD_SIZE>]]> for [<Array4x $dim>] {
                 #[inline(never)]
                 fn from(value: [u32; [<ARRAY_4X $dim _WORD_SIZE>]]) -> Self {
                     [<Array4x $dim>](value)
                 }
             }

             impl From<[<Array4x $dim>]> for [u32; [<ARRAY_4X $dim _WORD_SIZE>]] {
                 #[inline(never)]
                 fn from(value: [<Array4x $dim>]) -> Self {
                     value.0
                 }
             }
        }
    };
}

array4!(2);
array4!(4);
array4!(6);
array4!(8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_words_is_big_endian() {
        let arr = Array4x2::from([0x01, 0x02, 0x03, 0x04, 0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(arr.0, [0x0102_0304, 0xaabb_ccdd]);
    }

    #[test]
    fn test_words_to_bytes_round_trip() {
        let bytes: [u8; 16] = core::array::from_fn(|i| i as u8);
        let arr = Array4x4::from(bytes);
        let back: [u8; 16] = arr.into();
        assert_eq!(bytes, back);
    }

    #[test]
    fn test_word_array_round_trip() {
        let words = [1u32, 2, 3, 4, 5, 6, 7, 8];
        let arr = Array4x8::from(words);
        let back: [u32; 8] = arr.into();
        assert_eq!(words, back);
    }

    #[test]
    fn test_from_byte_ref() {
        let bytes = [0u8, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0, 5, 0, 0, 0, 6];
        let arr = Array4x6::from(&bytes);
        assert_eq!(arr.0, [1, 2, 3, 4, 5, 6]);
    }
}

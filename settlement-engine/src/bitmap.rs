use crate::constants::{
    SETTLEMENT_CLAIMS_ANCHOR_HEADER_SIZE, SETTLEMENT_CLAIMS_DISCRIMINATOR_PREIMAGE,
    SETTLEMENT_CLAIMS_VERSION,
};
use crate::error::{ErrorCode, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::hash::hashv;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction::MAX_PERMITTED_DATA_LENGTH;
use std::fmt::Debug;

const BITS_PER_BYTE: u8 = 8;

/// Size of the settlement claims account header the bitmap data follows.
pub const HEADER_SIZE: usize = SETTLEMENT_CLAIMS_ANCHOR_HEADER_SIZE;

/// Number of records the largest permitted settlement claims account can hold.
pub const MAX_RECORDS: u64 =
    (MAX_PERMITTED_DATA_LENGTH - HEADER_SIZE as u64) * BITS_PER_BYTE as u64;

/// BitmapProjection is a projection of a bitmap data structure stored in a byte array.
/// The projection stores the max_records number of records, max number of records expected to work with.
/// Record `index` lives in the byte `index / 8` at the bit `index % 8`, least significant bit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapProjection(pub u64);

impl BitmapProjection {
    /// Check if the provided data slice is large enough to store the bitmap.
    /// The provided data slice is expected to be only the bitmap data (no header).
    pub fn check_size(max_records: u64, bitmap_data: &[u8]) -> Result<()> {
        let required = Self::bitmap_size_in_bytes(max_records);
        if bitmap_data.len() < required {
            return Err(ErrorCode::BitmapSizeMismatch {
                required,
                actual: bitmap_data.len(),
            });
        }
        Ok(())
    }

    pub fn is_set(&self, index: u64, bitmap_data: &[u8]) -> Result<bool> {
        self.verify_index(index)?;
        let (byte_index, bit_index) = Self::bitmap_byte_index_and_bit_index(index);
        let bitmap_byte = Self::bitmap_byte(byte_index, bitmap_data)?;
        Ok(bitmap_byte & (1 << bit_index) != 0)
    }

    /// The only mutator of the bitmap, a set bit is never cleared.
    pub fn try_set(&self, index: u64, bitmap_data: &mut [u8]) -> Result<()> {
        if self.is_set(index, bitmap_data)? {
            return Err(ErrorCode::AlreadyClaimed { index });
        }
        // validity of index is checked in is_set
        let (byte_index, bit_index) = Self::bitmap_byte_index_and_bit_index(index);
        let byte = bitmap_data
            .get_mut(byte_index)
            .ok_or(ErrorCode::BitmapSizeMismatch {
                required: byte_index + 1,
                actual: 0,
            })?;
        *byte |= 1_u8 << bit_index;
        Ok(())
    }

    /// calculating number of bits(!) that are set to 1 in the bitmap_bytes slice
    pub fn number_of_bits(&self, bitmap_data: &[u8]) -> u64 {
        bitmap_data[..Self::bitmap_size_in_bytes(self.0).min(bitmap_data.len())]
            .iter()
            .map(|byte| byte.count_ones() as u64)
            .sum::<u64>()
    }

    /// number of bytes required for the bitmap to store the given number of records,
    /// every record consumes 1 bit in the bitmap, at least one byte is always reserved
    pub fn bitmap_size_in_bytes(max_records: u64) -> usize {
        let (byte_index, bit_index) = Self::bitmap_byte_index_and_bit_index(max_records);
        let size = if bit_index == 0 {
            byte_index
        } else {
            byte_index + 1_usize
        };
        size.max(1)
    }

    /// Bits in record order (index 0 first), grouped by bytes.
    pub fn debug_string(&self, bitmap_data: &[u8]) -> String {
        (0..self.0)
            .map(|index| match self.is_set(index, bitmap_data) {
                Ok(true) => '1',
                _ => '0',
            })
            .collect::<Vec<char>>()
            .chunks(BITS_PER_BYTE as usize)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<String>>()
            .join(",")
    }

    pub(crate) fn bitmap_byte_index_and_bit_index(index: u64) -> (usize, u8) {
        let byte_index = index / BITS_PER_BYTE as u64;
        let bit_index = (index % BITS_PER_BYTE as u64) as u8;
        (byte_index as usize, bit_index)
    }

    fn verify_index(&self, index: u64) -> Result<()> {
        if index >= self.0 {
            return Err(ErrorCode::IndexOutOfRange {
                index,
                max_records: self.0,
            });
        }
        Ok(())
    }

    fn bitmap_byte(byte_index: usize, bitmap_data: &[u8]) -> Result<u8> {
        bitmap_data
            .get(byte_index)
            .copied()
            .ok_or(ErrorCode::BitmapSizeMismatch {
                required: byte_index + 1,
                actual: bitmap_data.len(),
            })
    }
}

/// Metadata stored in front of the bitmap in the settlement claims account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementClaimsHeader {
    pub settlement: Pubkey,
    pub version: u8,
    pub max_records: u64,
}

impl SettlementClaimsHeader {
    pub fn discriminator() -> [u8; 8] {
        let mut discriminator = [0_u8; 8];
        discriminator
            .copy_from_slice(&hashv(&[SETTLEMENT_CLAIMS_DISCRIMINATOR_PREIMAGE]).to_bytes()[..8]);
        discriminator
    }

    pub fn try_from_account_data(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ErrorCode::InvalidSettlementClaimsData(format!(
                "data of {} bytes shorter than header size {}",
                data.len(),
                HEADER_SIZE
            )));
        }
        if data[..8] != Self::discriminator() {
            return Err(ErrorCode::InvalidSettlementClaimsData(
                "account discriminator mismatch".to_string(),
            ));
        }
        bincode::deserialize::<SettlementClaimsHeader>(&data[8..HEADER_SIZE])
            .map_err(|e| ErrorCode::InvalidSettlementClaimsData(e.to_string()))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < HEADER_SIZE {
            return Err(ErrorCode::InvalidSettlementClaimsData(format!(
                "buffer of {} bytes shorter than header size {}",
                data.len(),
                HEADER_SIZE
            )));
        }
        data[..HEADER_SIZE].fill(0);
        data[..8].copy_from_slice(&Self::discriminator());
        let serialized = bincode::serialize(self)
            .map_err(|e| ErrorCode::InvalidSettlementClaimsData(e.to_string()))?;
        data[8..8 + serialized.len()].copy_from_slice(&serialized);
        Ok(())
    }
}

/// Size of the settlement claims account: header + bitmap for the number of records.
pub fn account_size(max_records: u64) -> usize {
    HEADER_SIZE + BitmapProjection::bitmap_size_in_bytes(max_records)
}

/// The settlement claims account for `max_records` has to fit the maximal account size.
pub fn check_max_records(max_records: u64) -> Result<()> {
    if max_records > MAX_RECORDS {
        return Err(ErrorCode::SettlementClaimsTooManyRecords {
            max_records,
            limit: MAX_RECORDS,
        });
    }
    Ok(())
}

/// Deduplication bitmap of one settlement, one bit per merkle tree leaf index.
/// The struct owns a copy of the bitmap bytes (without the account header).
#[derive(Clone, PartialEq, Eq)]
pub struct ClaimBitmap {
    data: Vec<u8>,
    bitmap_projection: BitmapProjection,
}

impl ClaimBitmap {
    pub fn new(max_records: u64) -> Result<Self> {
        check_max_records(max_records)?;
        Ok(Self {
            data: vec![0_u8; BitmapProjection::bitmap_size_in_bytes(max_records)],
            bitmap_projection: BitmapProjection(max_records),
        })
    }

    /// Projects the bitmap from the raw account bytes, the first [HEADER_SIZE] bytes are skipped.
    pub fn from_bytes(max_records: u64, raw: &[u8]) -> Result<Self> {
        check_max_records(max_records)?;
        let bitmap_data = raw.get(HEADER_SIZE..).unwrap_or_default();
        BitmapProjection::check_size(max_records, bitmap_data)?;
        let size = BitmapProjection::bitmap_size_in_bytes(max_records);
        Ok(Self {
            data: bitmap_data[..size].to_vec(),
            bitmap_projection: BitmapProjection(max_records),
        })
    }

    /// Parses the header to get `max_records` and projects the bitmap after it.
    pub fn from_account_data(raw: &[u8]) -> Result<(SettlementClaimsHeader, Self)> {
        let header = SettlementClaimsHeader::try_from_account_data(raw)?;
        let bitmap = Self::from_bytes(header.max_records, raw)?;
        Ok((header, bitmap))
    }

    /// Serializes the header and the bitmap in the account layout.
    pub fn to_account_data(&self, settlement: &Pubkey) -> Result<Vec<u8>> {
        let mut data = vec![0_u8; HEADER_SIZE + self.data.len()];
        SettlementClaimsHeader {
            settlement: *settlement,
            version: SETTLEMENT_CLAIMS_VERSION,
            max_records: self.max_records(),
        }
        .write_to(&mut data)?;
        data[HEADER_SIZE..].copy_from_slice(&self.data);
        Ok(data)
    }

    pub fn max_records(&self) -> u64 {
        self.bitmap_projection.0
    }

    pub fn get(&self, index: u64) -> Result<bool> {
        self.bitmap_projection.is_set(index, &self.data)
    }

    pub fn try_set(&mut self, index: u64) -> Result<()> {
        self.bitmap_projection.try_set(index, &mut self.data)
    }

    pub fn count_claimed(&self) -> u64 {
        self.bitmap_projection.number_of_bits(&self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Debug for ClaimBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimBitmap")
            .field("max_records", &self.max_records())
            .field("set_bits", &self.count_claimed())
            .field(
                "bitmap_projection",
                &self.bitmap_projection.debug_string(&self.data),
            )
            .finish()
    }
}

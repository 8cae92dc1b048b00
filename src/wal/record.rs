use crate::error::{Error, Result};
use crate::types::Sequence;

/// Record type stored in the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Put = 0x01,
    Delete = 0x02,
    /// Closes a transaction batch. The value holds the commit sequence.
    Commit = 0x03,
}

impl RecordType {
    fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(RecordType::Put),
            0x02 => Ok(RecordType::Delete),
            0x03 => Ok(RecordType::Commit),
            _ => Err(Error::Corruption(format!("invalid record type: {}", byte))),
        }
    }
}

/// A single record in the WAL.
///
/// On-disk format:
/// ```text
/// ┌──────────┬────────┬──────────┬───────────┬───────────┬──────────┐
/// │ CRC (4B) │ Len(4B)│ Type(1B) │ Key Len(4B│ Key (var) │Val (var) │
/// └──────────┴────────┴──────────┴───────────┴───────────┴──────────┘
/// ```
///
/// CRC covers everything after the CRC field itself.
/// A transaction is written as its Put/Delete records followed by one Commit
/// record; replay applies a batch only once its Commit has been read.
#[derive(Debug, Clone)]
pub struct WALRecord {
    pub record_type: RecordType,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

// Header sizes
const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
const TYPE_SIZE: usize = 1;
const KEY_LEN_SIZE: usize = 4;
const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE + TYPE_SIZE + KEY_LEN_SIZE;

/// Bytes a record occupies on disk beyond its key and value.
pub const RECORD_OVERHEAD: usize = HEADER_SIZE;

impl WALRecord {
    /// Create a Put record.
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        WALRecord {
            record_type: RecordType::Put,
            key,
            value,
        }
    }

    /// Create a Delete record.
    pub fn delete(key: Vec<u8>) -> Self {
        WALRecord {
            record_type: RecordType::Delete,
            key,
            value: Vec::new(),
        }
    }

    /// Create the Commit record closing a batch.
    pub fn commit(sequence: Sequence) -> Self {
        WALRecord {
            record_type: RecordType::Commit,
            key: Vec::new(),
            value: sequence.to_le_bytes().to_vec(),
        }
    }

    /// Commit sequence carried by a Commit record.
    pub fn sequence(&self) -> Result<Sequence> {
        let bytes: [u8; 8] = self
            .value
            .as_slice()
            .try_into()
            .map_err(|_| Error::Corruption("commit record without sequence".into()))?;
        Ok(Sequence::from_le_bytes(bytes))
    }

    /// Serialize this record to bytes (including CRC header).
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = TYPE_SIZE + KEY_LEN_SIZE + self.key.len() + self.value.len();
        let total_len = CRC_SIZE + LEN_SIZE + payload_len;

        let mut buf = Vec::with_capacity(total_len);

        // Reserve space for CRC (filled at the end)
        buf.extend_from_slice(&[0u8; CRC_SIZE]);
        buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
        buf.push(self.record_type as u8);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Deserialize a record from bytes. Returns error if CRC doesn't match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption("record too short".into()));
        }

        let stored_crc = read_u32(&data[0..4]);
        let payload_len = read_u32(&data[4..8]) as usize;

        let total_len = CRC_SIZE + LEN_SIZE + payload_len;
        if payload_len < TYPE_SIZE + KEY_LEN_SIZE || data.len() < total_len {
            return Err(Error::Corruption("record truncated".into()));
        }

        let computed_crc = crc32fast::hash(&data[CRC_SIZE..total_len]);
        if stored_crc != computed_crc {
            return Err(Error::Corruption("CRC mismatch".into()));
        }

        let mut offset = CRC_SIZE + LEN_SIZE;

        let record_type = RecordType::from_u8(data[offset])?;
        offset += TYPE_SIZE;

        let key_len = read_u32(&data[offset..offset + KEY_LEN_SIZE]) as usize;
        offset += KEY_LEN_SIZE;

        if offset + key_len > total_len {
            return Err(Error::Corruption("key length exceeds record".into()));
        }
        let key = data[offset..offset + key_len].to_vec();
        offset += key_len;

        // Value is the rest of the record
        let value = data[offset..total_len].to_vec();

        Ok(WALRecord {
            record_type,
            key,
            value,
        })
    }

    /// Size of this record when serialized on disk.
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

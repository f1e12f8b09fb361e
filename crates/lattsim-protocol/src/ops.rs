//! Per-operation TLV payloads.
//!
//! Requests are parsed out of decrypted SECURE plaintexts; responses are
//! encoded into the `data` tail of a [`crate::secure::ReplyPlaintext`].
//! Decoders for the response layouts are provided as well — the test
//! harness plays the client SDK role and needs them.

use lattsim_common::models::{KvRecord, WalletDescriptor};

/// Operation codes carried in the SECURE envelope's `request_type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    GetAddresses = 0x01,
    Sign = 0x02,
    GetWallets = 0x03,
    GetKvRecords = 0x04,
    AddKvRecords = 0x05,
    RemoveKvRecords = 0x06,
    FetchEncryptedData = 0x07,
    Test = 0x08,
    FinalizePairing = 0x09,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::GetAddresses),
            0x02 => Some(Self::Sign),
            0x03 => Some(Self::GetWallets),
            0x04 => Some(Self::GetKvRecords),
            0x05 => Some(Self::AddKvRecords),
            0x06 => Some(Self::RemoveKvRecords),
            0x07 => Some(Self::FetchEncryptedData),
            0x08 => Some(Self::Test),
            0x09 => Some(Self::FinalizePairing),
            _ => None,
        }
    }

    /// Whether the operation needs an interactive user decision.
    pub fn requires_approval(&self) -> bool {
        matches!(
            self,
            Self::FinalizePairing | Self::Sign | Self::AddKvRecords | Self::RemoveKvRecords
        )
    }
}

/// TLV parse failure. Surfaces to the client as `invalidMsg`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    #[error("payload truncated")]
    Truncated,
    #[error("length field out of range")]
    BadLength,
    #[error("trailing bytes after payload")]
    TrailingBytes,
}

/// Forward-only reader over a TLV payload.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, TlvError> {
        let b = *self.buf.get(self.pos).ok_or(TlvError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn u16_be(&mut self) -> Result<u16, TlvError> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn u32_be(&mut self) -> Result<u32, TlvError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlvError> {
        let end = self.pos.checked_add(n).ok_or(TlvError::BadLength)?;
        let slice = self.buf.get(self.pos..end).ok_or(TlvError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn finish(self) -> Result<(), TlvError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(TlvError::TrailingBytes)
        }
    }
}

// ============================================================
// Requests
// ============================================================

/// `path_len:u8 | path[]:u32 BE | n:u8 | flag?:u8`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAddressesRequest {
    pub start_path: Vec<u32>,
    pub count: u8,
    pub flag: Option<u8>,
}

impl GetAddressesRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, TlvError> {
        let mut cur = Cursor::new(payload);
        let path_len = cur.u8()? as usize;
        let mut start_path = Vec::with_capacity(path_len);
        for _ in 0..path_len {
            start_path.push(cur.u32_be()?);
        }
        let count = cur.u8()?;
        let flag = if cur.remaining() > 0 { Some(cur.u8()?) } else { None };
        cur.finish()?;
        Ok(Self {
            start_path,
            count,
            flag,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.start_path.len() as u8];
        for seg in &self.start_path {
            out.extend_from_slice(&seg.to_be_bytes());
        }
        out.push(self.count);
        if let Some(flag) = self.flag {
            out.push(flag);
        }
        out
    }
}

/// `path_len:u8 | path[]:u32 BE | schema:u8 | curve:u8 | encoding:u8 |
/// hash_type:u8 | data_len:u16 BE | data[]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub path: Vec<u32>,
    pub schema: u8,
    pub curve: u8,
    pub encoding: u8,
    pub hash_type: u8,
    pub data: Vec<u8>,
}

impl SignRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, TlvError> {
        let mut cur = Cursor::new(payload);
        let path_len = cur.u8()? as usize;
        let mut path = Vec::with_capacity(path_len);
        for _ in 0..path_len {
            path.push(cur.u32_be()?);
        }
        let schema = cur.u8()?;
        let curve = cur.u8()?;
        let encoding = cur.u8()?;
        let hash_type = cur.u8()?;
        let data_len = cur.u16_be()? as usize;
        let data = cur.take(data_len)?.to_vec();
        cur.finish()?;
        Ok(Self {
            path,
            schema,
            curve,
            encoding,
            hash_type,
            data,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.path.len() as u8];
        for seg in &self.path {
            out.extend_from_slice(&seg.to_be_bytes());
        }
        out.extend_from_slice(&[self.schema, self.curve, self.encoding, self.hash_type]);
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// `name_len:u8 | app_name | sig_len:u8 | signature (DER)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizePairingRequest {
    pub app_name: Vec<u8>,
    pub signature_der: Vec<u8>,
}

impl FinalizePairingRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, TlvError> {
        let mut cur = Cursor::new(payload);
        let name_len = cur.u8()? as usize;
        let app_name = cur.take(name_len)?.to_vec();
        let sig_len = cur.u8()? as usize;
        let signature_der = cur.take(sig_len)?.to_vec();
        cur.finish()?;
        Ok(Self {
            app_name,
            signature_der,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.app_name.len() as u8];
        out.extend_from_slice(&self.app_name);
        out.push(self.signature_der.len() as u8);
        out.extend_from_slice(&self.signature_der);
        out
    }
}

/// `n:u8 | start:u32 BE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetKvRecordsRequest {
    pub count: u8,
    pub start: u32,
}

impl GetKvRecordsRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, TlvError> {
        let mut cur = Cursor::new(payload);
        let count = cur.u8()?;
        let start = cur.u32_be()?;
        cur.finish()?;
        Ok(Self { count, start })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.count];
        out.extend_from_slice(&self.start.to_be_bytes());
        out
    }
}

/// `count:u8 | count × (key_len:u8 | key | val_len:u8 | val)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddKvRecordsRequest {
    pub records: Vec<(Vec<u8>, Vec<u8>)>,
}

impl AddKvRecordsRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, TlvError> {
        let mut cur = Cursor::new(payload);
        let count = cur.u8()? as usize;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let key_len = cur.u8()? as usize;
            let key = cur.take(key_len)?.to_vec();
            let val_len = cur.u8()? as usize;
            let value = cur.take(val_len)?.to_vec();
            records.push((key, value));
        }
        cur.finish()?;
        Ok(Self { records })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.records.len() as u8];
        for (key, value) in &self.records {
            out.push(key.len() as u8);
            out.extend_from_slice(key);
            out.push(value.len() as u8);
            out.extend_from_slice(value);
        }
        out
    }
}

/// `count:u8 | count × id:u32 BE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveKvRecordsRequest {
    pub ids: Vec<u32>,
}

impl RemoveKvRecordsRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, TlvError> {
        let mut cur = Cursor::new(payload);
        let count = cur.u8()? as usize;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(cur.u32_be()?);
        }
        cur.finish()?;
        Ok(Self { ids })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.ids.len() as u8];
        for id in &self.ids {
            out.extend_from_slice(&id.to_be_bytes());
        }
        out
    }
}

// ============================================================
// Responses
// ============================================================

/// `n:u8 | n × (len:u8 | address utf-8)`
pub fn encode_addresses(addresses: &[String]) -> Vec<u8> {
    let mut out = vec![addresses.len() as u8];
    for addr in addresses {
        out.push(addr.len() as u8);
        out.extend_from_slice(addr.as_bytes());
    }
    out
}

pub fn decode_addresses(data: &[u8]) -> Result<Vec<String>, TlvError> {
    let mut cur = Cursor::new(data);
    let count = cur.u8()? as usize;
    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cur.u8()? as usize;
        let bytes = cur.take(len)?;
        addresses.push(String::from_utf8(bytes.to_vec()).map_err(|_| TlvError::BadLength)?);
    }
    cur.finish()?;
    Ok(addresses)
}

/// `recovery:u8 | sig_len:u8 | signature (DER)`
pub fn encode_signature(recovery: u8, der: &[u8]) -> Vec<u8> {
    let mut out = vec![recovery, der.len() as u8];
    out.extend_from_slice(der);
    out
}

pub fn decode_signature(data: &[u8]) -> Result<(u8, Vec<u8>), TlvError> {
    let mut cur = Cursor::new(data);
    let recovery = cur.u8()?;
    let len = cur.u8()? as usize;
    let der = cur.take(len)?.to_vec();
    cur.finish()?;
    Ok((recovery, der))
}

/// Two wallet records, internal then external:
/// `uid[32] | capabilities:u32 BE | external:u8 | name_len:u8 | name`.
/// An empty slot encodes as an all-zero uid with no name.
pub fn encode_wallets(internal: Option<&WalletDescriptor>, external: Option<&WalletDescriptor>) -> Vec<u8> {
    let mut out = Vec::new();
    for slot in [internal, external] {
        match slot {
            Some(wallet) => {
                out.extend_from_slice(&wallet.uid);
                out.extend_from_slice(&wallet.capabilities.to_be_bytes());
                out.push(wallet.external as u8);
                out.push(wallet.name.len() as u8);
                out.extend_from_slice(&wallet.name);
            }
            None => {
                out.extend_from_slice(&[0u8; 32]);
                out.extend_from_slice(&0u32.to_be_bytes());
                out.push(0);
                out.push(0);
            }
        }
    }
    out
}

pub fn decode_wallets(data: &[u8]) -> Result<Vec<Option<WalletDescriptor>>, TlvError> {
    let mut cur = Cursor::new(data);
    let mut slots = Vec::with_capacity(2);
    for _ in 0..2 {
        let uid: [u8; 32] = cur.take(32)?.try_into().map_err(|_| TlvError::Truncated)?;
        let capabilities = cur.u32_be()?;
        let external = cur.u8()? != 0;
        let name_len = cur.u8()? as usize;
        let name = cur.take(name_len)?.to_vec();
        if uid == [0u8; 32] {
            slots.push(None);
        } else {
            slots.push(Some(WalletDescriptor {
                uid,
                external,
                name,
                capabilities,
            }));
        }
    }
    cur.finish()?;
    Ok(slots)
}

/// `total:u32 BE | fetched:u8 | fetched × (id:u32 BE | key_len:u8 | key |
/// val_len:u8 | val)`
pub fn encode_kv_page(total: u32, records: &[KvRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&total.to_be_bytes());
    out.push(records.len() as u8);
    for record in records {
        out.extend_from_slice(&record.id.to_be_bytes());
        out.push(record.key.len() as u8);
        out.extend_from_slice(record.key.as_bytes());
        out.push(record.value.len() as u8);
        out.extend_from_slice(record.value.as_bytes());
    }
    out
}

pub fn decode_kv_page(data: &[u8]) -> Result<(u32, Vec<KvRecord>), TlvError> {
    let mut cur = Cursor::new(data);
    let total = cur.u32_be()?;
    let fetched = cur.u8()? as usize;
    let mut records = Vec::with_capacity(fetched);
    for _ in 0..fetched {
        let id = cur.u32_be()?;
        let key_len = cur.u8()? as usize;
        let key = String::from_utf8(cur.take(key_len)?.to_vec()).map_err(|_| TlvError::BadLength)?;
        let val_len = cur.u8()? as usize;
        let value =
            String::from_utf8(cur.take(val_len)?.to_vec()).map_err(|_| TlvError::BadLength)?;
        records.push(KvRecord { id, key, value });
    }
    cur.finish()?;
    Ok((total, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn opcodes_round_trip() {
        for value in 0x01u8..=0x09 {
            let op = OpCode::from_u8(value).expect("defined opcode");
            assert_eq!(op as u8, value);
        }
        assert!(OpCode::from_u8(0x00).is_none());
        assert!(OpCode::from_u8(0x0a).is_none());
    }

    #[test]
    fn approval_policy_matches_operations() {
        assert!(OpCode::Sign.requires_approval());
        assert!(OpCode::FinalizePairing.requires_approval());
        assert!(OpCode::AddKvRecords.requires_approval());
        assert!(OpCode::RemoveKvRecords.requires_approval());
        assert!(!OpCode::GetAddresses.requires_approval());
        assert!(!OpCode::GetWallets.requires_approval());
        assert!(!OpCode::GetKvRecords.requires_approval());
        assert!(!OpCode::Test.requires_approval());
        assert!(!OpCode::FetchEncryptedData.requires_approval());
    }

    #[test]
    fn get_addresses_flag_is_optional() {
        let without = GetAddressesRequest {
            start_path: vec![0x8000002c, 0x8000003c, 0x80000000, 0, 0],
            count: 3,
            flag: None,
        };
        assert_eq!(GetAddressesRequest::decode(&without.encode()).unwrap(), without);

        let with = GetAddressesRequest { flag: Some(4), ..without };
        assert_eq!(GetAddressesRequest::decode(&with.encode()).unwrap(), with);
    }

    #[test]
    fn sign_request_rejects_truncated_data() {
        let req = SignRequest {
            path: vec![0x8000002c, 0x8000003c, 0x80000000, 0, 0],
            schema: 0,
            curve: 0,
            encoding: 0,
            hash_type: 0,
            data: vec![1, 2, 3],
        };
        let mut bytes = req.encode();
        bytes.truncate(bytes.len() - 1);
        assert_eq!(SignRequest::decode(&bytes), Err(TlvError::Truncated));
    }

    #[test]
    fn requests_reject_trailing_bytes() {
        let req = GetKvRecordsRequest { count: 2, start: 2 };
        let mut bytes = req.encode();
        bytes.push(0);
        assert_eq!(GetKvRecordsRequest::decode(&bytes), Err(TlvError::TrailingBytes));
    }

    #[test]
    fn wallet_slots_encode_empty_as_zero_uid() {
        let internal = WalletDescriptor::internal("Lattsim");
        let slots = decode_wallets(&encode_wallets(Some(&internal), None)).unwrap();
        assert_eq!(slots[0].as_ref().unwrap().uid, internal.uid);
        assert!(slots[1].is_none());
    }

    proptest! {
        #[test]
        fn add_kv_round_trip(
            records in proptest::collection::vec(
                (
                    proptest::collection::vec(any::<u8>(), 1..63),
                    proptest::collection::vec(any::<u8>(), 1..63),
                ),
                0..8,
            )
        ) {
            let req = AddKvRecordsRequest { records };
            prop_assert_eq!(AddKvRecordsRequest::decode(&req.encode()).unwrap(), req);
        }

        #[test]
        fn sign_round_trip(
            path in proptest::collection::vec(any::<u32>(), 0..7),
            data in proptest::collection::vec(any::<u8>(), 1..512),
            meta in any::<[u8; 4]>(),
        ) {
            let req = SignRequest {
                path,
                schema: meta[0],
                curve: meta[1],
                encoding: meta[2],
                hash_type: meta[3],
                data,
            };
            prop_assert_eq!(SignRequest::decode(&req.encode()).unwrap(), req);
        }

        #[test]
        fn kv_page_round_trip(
            total in any::<u32>(),
            records in proptest::collection::vec(
                (any::<u32>(), "[a-z]{1,16}", "[a-z0-9]{1,16}"),
                0..6,
            )
        ) {
            let records: Vec<KvRecord> = records
                .into_iter()
                .map(|(id, key, value)| KvRecord { id, key, value })
                .collect();
            let encoded = encode_kv_page(total, &records);
            let (decoded_total, decoded) = decode_kv_page(&encoded).unwrap();
            prop_assert_eq!(decoded_total, total);
            prop_assert_eq!(decoded, records);
        }
    }
}

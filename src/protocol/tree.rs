//! Packet tree assembly.
//!
//! A logical response may span many physical packets. The device opens it
//! with `PROCESSING` and closes it with a `RESULT` carrying the same command
//! id. In between it sends either:
//!
//! - `STATUS` packets with the same command id (a continuation; the tree
//!   becomes a [`TreePayload::Sequence`]), or
//! - packets with other command ids (nested entities; the tree becomes a
//!   [`TreePayload::Map`] keyed by those ids). Nested entities may open their
//!   own `PROCESSING` scope, to any depth.
//!
//! The first child decides the variant. A later child of the other sort is
//! rejected with [`BmapError::MixedChildren`].
//!
//! ```text
//! PROCESSING 0x0101
//!   STATUS   0x0102 "Headphones"      ─┐
//!   STATUS   0x0103 01                 ├─ Map { 0x0102: leaf, 0x0103: leaf }
//! RESULT     0x0101                   ─┘
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use tokio::io::AsyncRead;

use super::packet::Packet;
use super::packet_buffer::PacketReader;
use super::wire_format::{to_hex, PacketKind};
use crate::error::{BmapError, DeviceError, Result};

/// Payload of an assembled tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreePayload {
    /// Raw payload of a single `STATUS` packet.
    Leaf(#[serde(serialize_with = "serialize_hex")] Bytes),
    /// Continuation packets sharing the root's command id, in arrival order.
    Sequence(Vec<PacketTree>),
    /// Nested entities keyed by their command id.
    Map(BTreeMap<u16, PacketTree>),
}

fn serialize_hex<S: Serializer>(bytes: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_hex(bytes))
}

/// One fully assembled response or notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketTree {
    /// Command id of the root packet.
    pub cmd: u16,
    /// Kind of the root packet.
    pub kind: PacketKind,
    /// Leaf bytes, or the children collected by a `PROCESSING` scope.
    pub payload: TreePayload,
}

impl PacketTree {
    /// Leaf tree from a single packet.
    pub fn leaf(packet: Packet) -> Self {
        Self {
            cmd: packet.cmd,
            kind: packet.kind,
            payload: TreePayload::Leaf(packet.payload),
        }
    }

    /// Leaf payload of a `STATUS` tree.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedKind` for any other tree.
    pub fn expect_status(&self) -> Result<&Bytes> {
        match (&self.kind, &self.payload) {
            (PacketKind::Status, TreePayload::Leaf(bytes)) => Ok(bytes),
            _ => Err(self.unexpected()),
        }
    }

    /// Continuation packets of a sequence tree.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedKind` if the tree is not a sequence.
    pub fn expect_sequence(&self) -> Result<&[PacketTree]> {
        match &self.payload {
            TreePayload::Sequence(items) => Ok(items),
            _ => Err(self.unexpected()),
        }
    }

    /// Nested entities of a map tree, keyed by command id.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedKind` if the tree is not a map.
    pub fn expect_map(&self) -> Result<&BTreeMap<u16, PacketTree>> {
        match &self.payload {
            TreePayload::Map(map) => Ok(map),
            _ => Err(self.unexpected()),
        }
    }

    fn unexpected(&self) -> BmapError {
        BmapError::UnexpectedKind {
            cmd: self.cmd,
            kind: self.kind,
        }
    }

    /// Nested entity of a map tree.
    pub fn get(&self, cmd: u16) -> Option<&PacketTree> {
        match &self.payload {
            TreePayload::Map(map) => map.get(&cmd),
            _ => None,
        }
    }

    /// Continuation packets of a sequence tree; empty otherwise.
    pub fn children(&self) -> &[PacketTree] {
        match &self.payload {
            TreePayload::Sequence(items) => items,
            _ => &[],
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.payload, TreePayload::Leaf(_))
    }
}

/// Children collected so far by an open `PROCESSING` scope.
///
/// Moves from `Undecided` to exactly one of the other variants and stays
/// there.
#[derive(Debug)]
enum Body {
    Undecided,
    Sequence(Vec<PacketTree>),
    Map(BTreeMap<u16, PacketTree>),
}

#[derive(Debug)]
struct OpenScope {
    cmd: u16,
    kind: PacketKind,
    body: Body,
}

impl OpenScope {
    fn append(&mut self, leaf: PacketTree) -> Result<()> {
        match &mut self.body {
            Body::Undecided => self.body = Body::Sequence(vec![leaf]),
            Body::Sequence(items) => items.push(leaf),
            Body::Map(_) => return Err(BmapError::MixedChildren { cmd: self.cmd }),
        }
        Ok(())
    }

    fn commit_nested(&mut self) -> Result<()> {
        match self.body {
            Body::Undecided => self.body = Body::Map(BTreeMap::new()),
            Body::Map(_) => {}
            Body::Sequence(_) => return Err(BmapError::MixedChildren { cmd: self.cmd }),
        }
        Ok(())
    }

    fn insert(&mut self, child: PacketTree) -> Result<()> {
        match &mut self.body {
            Body::Map(map) => {
                if map.contains_key(&child.cmd) {
                    tracing::debug!(
                        "Replacing repeated entry 0x{:04x} in response for 0x{:04x}",
                        child.cmd,
                        self.cmd
                    );
                }
                map.insert(child.cmd, child);
                Ok(())
            }
            _ => Err(BmapError::MixedChildren { cmd: self.cmd }),
        }
    }

    fn close(self) -> PacketTree {
        let payload = match self.body {
            Body::Undecided => TreePayload::Sequence(Vec::new()),
            Body::Sequence(items) => TreePayload::Sequence(items),
            Body::Map(map) => TreePayload::Map(map),
        };
        PacketTree {
            cmd: self.cmd,
            kind: self.kind,
            payload,
        }
    }
}

/// Folds physical packets into [`PacketTree`]s.
///
/// Feed packets in arrival order with [`push`](Self::push). Open
/// `PROCESSING` scopes are kept on an explicit stack, so nesting depth is
/// not bounded by the call stack.
#[derive(Debug, Default)]
pub struct TreeAssembler {
    open: Vec<OpenScope>,
}

impl TreeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet.
    ///
    /// Returns `Ok(Some(tree))` when a top-level tree is complete and
    /// `Ok(None)` while more packets are needed.
    ///
    /// # Errors
    ///
    /// Device `ERROR` packets, unexpected kinds and mixed children fail the
    /// whole tree. All partial state is discarded; the next packet starts a
    /// new tree.
    pub fn push(&mut self, packet: Packet) -> Result<Option<PacketTree>> {
        let result = self.fold(packet);
        if result.is_err() {
            self.open.clear();
        }
        result
    }

    /// Number of open `PROCESSING` scopes.
    #[inline]
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Whether a tree is partially assembled.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.open.is_empty()
    }

    /// Discard any partial tree.
    pub fn reset(&mut self) {
        self.open.clear();
    }

    fn fold(&mut self, packet: Packet) -> Result<Option<PacketTree>> {
        let Some(scope) = self.open.last_mut() else {
            return self.begin(packet);
        };

        if packet.cmd != scope.cmd {
            scope.commit_nested()?;
            return self.begin(packet);
        }

        match packet.kind {
            PacketKind::Status => {
                scope.append(PacketTree::leaf(packet))?;
                Ok(None)
            }
            PacketKind::Result => match self.open.pop() {
                Some(scope) => self.complete(scope.close()),
                None => Ok(None),
            },
            kind => Err(BmapError::UnexpectedKind {
                cmd: packet.cmd,
                kind,
            }),
        }
    }

    /// Handle a packet that starts a new entity, top-level or nested.
    fn begin(&mut self, packet: Packet) -> Result<Option<PacketTree>> {
        match packet.kind {
            PacketKind::Status => self.complete(PacketTree::leaf(packet)),
            PacketKind::Error => {
                Err(DeviceError::from_payload(packet.cmd, packet.payload).into())
            }
            PacketKind::Result => self.complete(PacketTree {
                cmd: packet.cmd,
                kind: packet.kind,
                payload: TreePayload::Sequence(Vec::new()),
            }),
            PacketKind::Processing => {
                self.open.push(OpenScope {
                    cmd: packet.cmd,
                    kind: packet.kind,
                    body: Body::Undecided,
                });
                Ok(None)
            }
            kind => Err(BmapError::UnexpectedKind {
                cmd: packet.cmd,
                kind,
            }),
        }
    }

    /// Hand a finished entity to its parent scope, or out if top-level.
    fn complete(&mut self, tree: PacketTree) -> Result<Option<PacketTree>> {
        match self.open.last_mut() {
            Some(parent) => {
                parent.insert(tree)?;
                Ok(None)
            }
            None => Ok(Some(tree)),
        }
    }
}

/// Read packets until one top-level tree is complete.
///
/// Returns `Ok(None)` if the stream ends first; a partially assembled tree
/// is dropped in that case.
pub async fn read_tree<R: AsyncRead + Unpin>(
    reader: &mut PacketReader<R>,
) -> Result<Option<PacketTree>> {
    let mut assembler = TreeAssembler::new();
    loop {
        let Some(packet) = reader.read_packet().await? else {
            if !assembler.is_idle() {
                tracing::debug!(
                    "Stream ended with {} open response scope(s)",
                    assembler.depth()
                );
            }
            return Ok(None);
        };
        if let Some(tree) = assembler.push(packet)? {
            return Ok(Some(tree));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_packet, ErrorCode};
    use tokio::io::AsyncWriteExt;

    fn pkt(cmd: u16, kind: PacketKind, payload: &[u8]) -> Packet {
        Packet::from_parts(cmd, kind, payload)
    }

    /// Feed packets, expecting exactly the last one to complete a tree.
    fn assemble(packets: Vec<Packet>) -> Result<PacketTree> {
        let mut assembler = TreeAssembler::new();
        let count = packets.len();
        for (i, packet) in packets.into_iter().enumerate() {
            let out = assembler.push(packet)?;
            if i + 1 < count {
                assert!(out.is_none(), "tree completed early at packet {}", i);
            } else {
                return Ok(out.expect("tree incomplete after last packet"));
            }
        }
        unreachable!("no packets")
    }

    #[test]
    fn test_status_root_is_leaf() {
        let tree = assemble(vec![pkt(0x0202, PacketKind::Status, &[70])]).unwrap();
        assert_eq!(tree.cmd, 0x0202);
        assert_eq!(tree.kind, PacketKind::Status);
        assert_eq!(tree.payload, TreePayload::Leaf(Bytes::from_static(&[70])));
        assert_eq!(&tree.expect_status().unwrap()[..], &[70]);
    }

    #[test]
    fn test_result_root_is_empty_sequence() {
        let tree = assemble(vec![pkt(0x0403, PacketKind::Result, &[])]).unwrap();
        assert_eq!(tree.kind, PacketKind::Result);
        assert_eq!(tree.payload, TreePayload::Sequence(vec![]));
        assert!(tree.expect_status().is_err());
    }

    #[test]
    fn test_sequence_assembly() {
        let tree = assemble(vec![
            pkt(0x0404, PacketKind::Processing, &[]),
            pkt(0x0404, PacketKind::Status, b"a"),
            pkt(0x0404, PacketKind::Status, b"b"),
            pkt(0x0404, PacketKind::Status, b"c"),
            pkt(0x0404, PacketKind::Result, &[]),
        ])
        .unwrap();

        assert_eq!(tree.cmd, 0x0404);
        assert_eq!(tree.kind, PacketKind::Processing);
        let payloads: Vec<_> = tree
            .children()
            .iter()
            .map(|c| c.expect_status().unwrap().to_vec())
            .collect();
        assert_eq!(payloads, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_typed_accessors_reject_wrong_shape() {
        let sequence = assemble(vec![
            pkt(0x0404, PacketKind::Processing, &[]),
            pkt(0x0404, PacketKind::Status, b"a"),
            pkt(0x0404, PacketKind::Result, &[]),
        ])
        .unwrap();
        assert_eq!(sequence.expect_sequence().unwrap().len(), 1);
        assert!(matches!(
            sequence.expect_map(),
            Err(BmapError::UnexpectedKind {
                cmd: 0x0404,
                kind: PacketKind::Processing
            })
        ));

        let map = assemble(vec![
            pkt(0x0101, PacketKind::Processing, &[]),
            pkt(0x0102, PacketKind::Status, b"Headphones"),
            pkt(0x0101, PacketKind::Result, &[]),
        ])
        .unwrap();
        assert!(map.expect_map().unwrap().contains_key(&0x0102));
        assert!(map.expect_sequence().is_err());

        let leaf = assemble(vec![pkt(0x0202, PacketKind::Status, &[70])]).unwrap();
        assert!(leaf.expect_sequence().is_err());
        assert!(leaf.expect_map().is_err());
    }

    #[test]
    fn test_processing_then_result_is_empty_sequence() {
        let tree = assemble(vec![
            pkt(0x0101, PacketKind::Processing, &[]),
            pkt(0x0101, PacketKind::Result, &[]),
        ])
        .unwrap();
        assert_eq!(tree.payload, TreePayload::Sequence(vec![]));
    }

    #[test]
    fn test_nested_assembly() {
        let tree = assemble(vec![
            pkt(0x0101, PacketKind::Processing, &[]),
            pkt(0x0102, PacketKind::Status, b"Headphones"),
            pkt(0x0101, PacketKind::Result, &[]),
        ])
        .unwrap();

        let TreePayload::Map(map) = &tree.payload else {
            panic!("expected map, got {:?}", tree.payload);
        };
        assert_eq!(map.len(), 1);
        let child = tree.get(0x0102).unwrap();
        assert_eq!(child.kind, PacketKind::Status);
        assert_eq!(&child.expect_status().unwrap()[..], b"Headphones");
    }

    #[test]
    fn test_deep_nesting() {
        let tree = assemble(vec![
            pkt(0x0100, PacketKind::Processing, &[]),
            pkt(0x0101, PacketKind::Processing, &[]),
            pkt(0x0102, PacketKind::Status, b"name"),
            pkt(0x0103, PacketKind::Processing, &[]),
            pkt(0x0103, PacketKind::Status, &[1]),
            pkt(0x0103, PacketKind::Status, &[2]),
            pkt(0x0103, PacketKind::Result, &[]),
            pkt(0x0101, PacketKind::Result, &[]),
            pkt(0x0104, PacketKind::Status, &[9]),
            pkt(0x0100, PacketKind::Result, &[]),
        ])
        .unwrap();

        assert_eq!(tree.cmd, 0x0100);
        let inner = tree.get(0x0101).unwrap();
        assert_eq!(&inner.get(0x0102).unwrap().expect_status().unwrap()[..], b"name");
        assert_eq!(inner.get(0x0103).unwrap().children().len(), 2);
        assert!(tree.get(0x0104).unwrap().is_leaf());
    }

    #[test]
    fn test_nested_result_child() {
        let tree = assemble(vec![
            pkt(0x0400, PacketKind::Processing, &[]),
            pkt(0x0407, PacketKind::Result, &[]),
            pkt(0x0400, PacketKind::Result, &[]),
        ])
        .unwrap();
        assert_eq!(
            tree.get(0x0407).unwrap().payload,
            TreePayload::Sequence(vec![])
        );
    }

    #[test]
    fn test_error_root_fails_with_code() {
        let mut assembler = TreeAssembler::new();
        let err = assembler
            .push(pkt(0x0102, PacketKind::Error, &[0x09]))
            .unwrap_err();

        match err {
            BmapError::Device(e) => {
                assert_eq!(e.cmd, 0x0102);
                assert_eq!(e.code, Some(ErrorCode::Timeout));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_error_inside_aggregation_discards_partial_tree() {
        let mut assembler = TreeAssembler::new();
        assembler.push(pkt(0x0101, PacketKind::Processing, &[])).unwrap();
        assembler.push(pkt(0x0102, PacketKind::Status, b"x")).unwrap();
        assert_eq!(assembler.depth(), 1);

        let err = assembler.push(pkt(0x0103, PacketKind::Error, &[0x04]));
        assert!(matches!(err, Err(BmapError::Device(_))));
        assert!(assembler.is_idle());

        let tree = assembler
            .push(pkt(0x0202, PacketKind::Status, &[55]))
            .unwrap()
            .unwrap();
        assert_eq!(tree.cmd, 0x0202);
    }

    #[test]
    fn test_outbound_kind_is_rejected() {
        let mut assembler = TreeAssembler::new();
        let err = assembler.push(pkt(0x0001, PacketKind::Get, &[])).unwrap_err();
        assert!(matches!(
            err,
            BmapError::UnexpectedKind {
                cmd: 0x0001,
                kind: PacketKind::Get
            }
        ));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let mut assembler = TreeAssembler::new();
        let err = assembler
            .push(pkt(0x0001, PacketKind::Unknown(0x2a), &[]))
            .unwrap_err();
        assert!(matches!(err, BmapError::UnexpectedKind { .. }));
    }

    #[test]
    fn test_unexpected_continuation_kind() {
        let mut assembler = TreeAssembler::new();
        assembler.push(pkt(0x0404, PacketKind::Processing, &[])).unwrap();
        let err = assembler
            .push(pkt(0x0404, PacketKind::Processing, &[]))
            .unwrap_err();
        assert!(matches!(
            err,
            BmapError::UnexpectedKind {
                cmd: 0x0404,
                kind: PacketKind::Processing
            }
        ));
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_nested_after_sequence_is_mixed() {
        let mut assembler = TreeAssembler::new();
        assembler.push(pkt(0x0404, PacketKind::Processing, &[])).unwrap();
        assembler.push(pkt(0x0404, PacketKind::Status, b"a")).unwrap();
        let err = assembler
            .push(pkt(0x0405, PacketKind::Status, b"b"))
            .unwrap_err();
        assert!(matches!(err, BmapError::MixedChildren { cmd: 0x0404 }));
    }

    #[test]
    fn test_sequence_after_nested_is_mixed() {
        let mut assembler = TreeAssembler::new();
        assembler.push(pkt(0x0101, PacketKind::Processing, &[])).unwrap();
        assembler.push(pkt(0x0102, PacketKind::Status, b"a")).unwrap();
        let err = assembler
            .push(pkt(0x0101, PacketKind::Status, b"b"))
            .unwrap_err();
        assert!(matches!(err, BmapError::MixedChildren { cmd: 0x0101 }));
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_tree_serializes_as_json() {
        let tree = assemble(vec![
            pkt(0x0101, PacketKind::Processing, &[]),
            pkt(0x0102, PacketKind::Status, &[0x48, 0x69]),
            pkt(0x0101, PacketKind::Result, &[]),
        ])
        .unwrap();

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["cmd"], 0x0101);
        assert_eq!(json["kind"], "PROCESSING");
        assert_eq!(json["payload"]["map"]["258"]["payload"]["leaf"], "48 69");
    }

    #[tokio::test]
    async fn test_read_tree_from_stream() {
        let (mut device, host) = tokio::io::duplex(256);
        let mut reader = PacketReader::new(host);

        for (cmd, kind, payload) in [
            (0x0101, PacketKind::Processing, &b""[..]),
            (0x0102, PacketKind::Status, &b"n"[..]),
            (0x0101, PacketKind::Result, &b""[..]),
            (0x0202, PacketKind::Status, &[40u8][..]),
        ] {
            device
                .write_all(&encode_packet(cmd, kind, payload).unwrap())
                .await
                .unwrap();
        }
        drop(device);

        let first = read_tree(&mut reader).await.unwrap().unwrap();
        assert_eq!(first.cmd, 0x0101);
        let second = read_tree(&mut reader).await.unwrap().unwrap();
        assert_eq!(second.cmd, 0x0202);
        assert!(read_tree(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_tree_closed_mid_aggregation() {
        let (mut device, host) = tokio::io::duplex(256);
        let mut reader = PacketReader::new(host);

        device
            .write_all(&encode_packet(0x0404, PacketKind::Processing, &[]).unwrap())
            .await
            .unwrap();
        device
            .write_all(&encode_packet(0x0404, PacketKind::Status, b"dev").unwrap())
            .await
            .unwrap();
        drop(device);

        assert!(read_tree(&mut reader).await.unwrap().is_none());
    }
}

//! Property tests for framing, the stream codec and the frame queue.

use bytes::{BufMut, Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

use vidstream_core::*;

fn framer() -> WireFramer {
    WireFramer::new(StreamLimits::for_dimensions(64, 64))
}

proptest! {
    #[test]
    fn framer_round_trips_any_payload(
        payload in proptest::collection::vec(any::<u8>(), 1..4096),
        sequence in any::<u64>(),
        timestamp in any::<u64>(),
        dims in proptest::option::of((1u32..4096, 1u32..4096)),
    ) {
        let mut meta = FrameMetadata::new(payload.len() as u64, timestamp).with_sequence(sequence);
        if let Some((w, h)) = dims {
            meta = meta.with_dimensions(w, h);
        }

        let block = framer().encode(&meta, &payload).unwrap();
        let (decoded, body) = framer().decode(block).unwrap();

        prop_assert_eq!(decoded, meta);
        prop_assert_eq!(body.as_ref(), payload.as_slice());
    }

    #[test]
    fn datagram_framer_round_trips_up_to_datagram_size(
        payload in proptest::collection::vec(any::<u8>(), 1..60_000),
        sequence in any::<u64>(),
        timestamp in any::<u64>(),
    ) {
        let framer = WireFramer::for_datagram(StreamLimits::datagram()).unwrap();
        let meta = FrameMetadata::new(payload.len() as u64, timestamp)
            .with_sequence(sequence)
            .with_dimensions(640, 480);

        let block = framer.encode(&meta, &payload).unwrap();
        prop_assert!(block.len() <= MAX_DATAGRAM_SIZE);
        let (decoded, body) = framer.decode(block).unwrap();

        prop_assert_eq!(decoded, meta);
        prop_assert_eq!(body.as_ref(), payload.as_slice());
    }

    #[test]
    fn blocks_without_delimiter_are_framing_errors(
        block in proptest::collection::vec(1u8..=255, 0..2048),
    ) {
        let err = framer().decode(Bytes::from(block)).unwrap_err();
        prop_assert!(matches!(err, StreamError::Framing(_)));
        prop_assert!(!err.is_fatal());
    }

    #[test]
    fn prefix_above_limit_is_reported_oversized(
        max in 1usize..10_000,
        excess in 1usize..100_000,
    ) {
        let announced = max + excess;
        let mut codec = LengthPrefixCodec::new(max);
        let mut buf = BytesMut::new();
        buf.put_u32_le(announced as u32);

        let item = codec.decode(&mut buf).unwrap();
        prop_assert_eq!(item, Some(StreamItem::Oversized { announced }));
        prop_assert!(codec.is_discarding());
    }

    #[test]
    fn codec_reassembles_across_arbitrary_splits(
        blocks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..512), 1..8),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let mut codec = LengthPrefixCodec::new(1024);
        let mut wire = BytesMut::new();
        for block in &blocks {
            codec.encode(Bytes::from(block.clone()), &mut wire).unwrap();
        }
        let wire = wire.freeze();

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(wire.len() + 1)).collect();
        points.push(wire.len());
        points.sort_unstable();

        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        let mut at = 0;
        for point in points {
            buf.extend_from_slice(&wire[at..point]);
            at = point;
            while let Some(item) = codec.decode(&mut buf).unwrap() {
                out.push(item);
            }
        }

        let expected: Vec<StreamItem> = blocks
            .into_iter()
            .map(|b| StreamItem::Block(Bytes::from(b)))
            .collect();
        prop_assert_eq!(out, expected);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn drop_newest_keeps_the_first_frames(capacity in 1usize..32, extra in 1usize..32) {
        let queue = BoundedFrameQueue::new(capacity, OverflowPolicy::DropNewest);
        let total = capacity + extra;
        for i in 0..total {
            queue.push(i);
            prop_assert!(queue.len() <= capacity);
        }
        prop_assert_eq!(queue.dropped(), extra as u64);

        let kept: Vec<usize> = std::iter::from_fn(|| queue.try_pop()).collect();
        prop_assert_eq!(kept, (0..capacity).collect::<Vec<_>>());
    }

    #[test]
    fn drop_oldest_keeps_the_last_frames(capacity in 1usize..32, extra in 1usize..32) {
        let queue = BoundedFrameQueue::new(capacity, OverflowPolicy::DropOldest);
        let total = capacity + extra;
        for i in 0..total {
            queue.push(i);
            prop_assert!(queue.len() <= capacity);
        }
        prop_assert_eq!(queue.dropped(), extra as u64);

        let kept: Vec<usize> = std::iter::from_fn(|| queue.try_pop()).collect();
        prop_assert_eq!(kept, (extra..total).collect::<Vec<_>>());
    }
}

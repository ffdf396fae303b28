use std::time::Duration;

use solo_live::codec::EncodedBlob;
use solo_live::services::live::{OutboundQueue, QueueStats};

fn audio(tag: u8) -> EncodedBlob {
    EncodedBlob::new(&[tag, 0], "audio/pcm;rate=16000")
}

fn still() -> EncodedBlob {
    EncodedBlob::new(&[0xFF, 0xD8], "image/jpeg")
}

#[test]
fn test_fifo_order() {
    let queue = OutboundQueue::new(8);
    for tag in 0..3 {
        assert!(!queue.push(audio(tag)));
    }
    let popped: Vec<EncodedBlob> = std::iter::from_fn(|| queue.try_pop()).collect();
    assert_eq!(popped, vec![audio(0), audio(1), audio(2)]);
}

#[test]
fn test_drop_oldest_when_full() {
    let queue = OutboundQueue::new(2);
    queue.push(audio(1));
    queue.push(audio(2));

    // 1. Third push evicts the oldest
    assert!(queue.push(audio(3)));
    assert_eq!(queue.len(), 2);

    // 2. Survivors keep capture order
    assert_eq!(queue.try_pop(), Some(audio(2)));
    assert_eq!(queue.try_pop(), Some(audio(3)));
    assert_eq!(queue.stats().dropped, 1);
}

#[test]
fn test_stats_by_kind() {
    let queue = OutboundQueue::new(8);
    queue.push(audio(1));
    queue.push(still());
    queue.push(audio(2));
    queue.try_pop();
    queue.try_pop();

    assert_eq!(
        queue.stats(),
        QueueStats {
            audio_delivered: 1,
            video_delivered: 1,
            dropped: 0,
            pending: 1,
        }
    );
}

#[test]
fn test_close_discards_and_rejects() {
    let queue = OutboundQueue::new(4);
    queue.push(audio(1));
    queue.close();
    queue.close();

    assert!(queue.is_closed());
    assert!(queue.is_empty());
    assert!(!queue.push(audio(2)));
    assert!(queue.is_empty(), "pushes after close are ignored");
}

#[tokio::test]
async fn test_pop_waits_for_push() {
    let queue = OutboundQueue::new(4);
    let producer = queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.push(audio(7));
    });

    let blob = tokio::time::timeout(Duration::from_secs(2), queue.pop())
        .await
        .expect("pop never woke");
    assert_eq!(blob, Some(audio(7)));
}

#[tokio::test]
async fn test_close_wakes_waiting_pop() {
    let queue = OutboundQueue::new(4);
    let closer = queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        closer.close();
    });

    let blob = tokio::time::timeout(Duration::from_secs(2), queue.pop())
        .await
        .expect("close did not wake pop");
    assert_eq!(blob, None);
}

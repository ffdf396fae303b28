use solo_live::codec::pcm::{pcm_mime, samples_to_pcm};
use solo_live::codec::transport::{decode_base64, encode_base64, pcm_rate};
use solo_live::codec::{decode_frame, encode_frame, EncodedBlob, PlaybackBuffer, INPUT_MIME};
use solo_live::error::LiveError;

#[test]
fn test_round_trip_within_quantization() {
    let input = [0.5f32, -0.5, 0.0, 0.123, -0.999];
    let blob = encode_frame(&input);
    assert_eq!(blob.mime_type, INPUT_MIME);

    let bytes = blob.bytes().unwrap();
    let decoded = decode_frame(&bytes, 16_000, 1).unwrap();

    assert_eq!(decoded.frames(), input.len());
    for (a, b) in input.iter().zip(decoded.channels[0].iter()) {
        assert!((a - b).abs() <= 1.0 / 32768.0, "{} vs {}", a, b);
    }
}

#[test]
fn test_encode_little_endian_and_wrap() {
    // 0.5 -> 16384 = 0x4000; 1.0 -> 32768 wraps to -32768 = 0x8000
    let bytes = samples_to_pcm(&[0.5, 1.0, -1.0]);
    assert_eq!(bytes, vec![0x00, 0x40, 0x00, 0x80, 0x00, 0x80]);
}

#[test]
fn test_encode_truncates_toward_zero() {
    // 0.00002 * 32768 = 0.655 -> 0
    let bytes = samples_to_pcm(&[0.00002, -0.00002]);
    assert_eq!(bytes, vec![0, 0, 0, 0]);
}

#[test]
fn test_decode_deinterleaves() {
    let bytes = samples_to_pcm(&[0.5, -0.5, 0.25, -0.25]);
    let buffer = decode_frame(&bytes, 24_000, 2).unwrap();

    assert_eq!(buffer.channel_count(), 2);
    assert_eq!(buffer.channels[0], vec![0.5, 0.25]);
    assert_eq!(buffer.channels[1], vec![-0.5, -0.25]);
    assert_eq!(buffer.frames(), 2);
}

#[test]
fn test_decode_rejects_bad_length() {
    let err = decode_frame(&[0, 1, 2], 24_000, 1).unwrap_err();
    assert_eq!(err, LiveError::MalformedAudio { len: 3, channels: 1 });

    // 6 bytes = 3 samples, not a whole number of stereo frames
    assert!(decode_frame(&[0; 6], 24_000, 2).is_err());
    assert!(decode_frame(&[0; 4], 24_000, 0).is_err());
}

#[test]
fn test_empty_frame() {
    let buffer = decode_frame(&[], 24_000, 1).unwrap();
    assert!(buffer.is_empty());
    assert_eq!(buffer.duration(), 0.0);
}

#[test]
fn test_duration() {
    let buffer = PlaybackBuffer::mono(vec![0.0; 12_000], 24_000);
    assert_eq!(buffer.duration(), 0.5);
}

#[test]
fn test_interleave_upmix_and_fold() {
    let mono = PlaybackBuffer::mono(vec![0.1, 0.2], 24_000);
    assert_eq!(mono.interleaved(2), vec![0.1, 0.1, 0.2, 0.2]);

    let stereo = PlaybackBuffer {
        sample_rate: 24_000,
        channels: vec![vec![0.2, 0.4], vec![0.0, 0.0]],
    };
    assert_eq!(stereo.interleaved(1), vec![0.1, 0.2]);
    assert_eq!(stereo.interleaved(2), vec![0.2, 0.0, 0.4, 0.0]);
}

#[test]
fn test_base64_pair() {
    let bytes = [0u8, 255, 16, 32];
    let text = encode_base64(&bytes);
    assert_eq!(text, "AP8QIA==");
    assert_eq!(decode_base64(&text).unwrap(), bytes);
    assert!(matches!(decode_base64("not base64!"), Err(LiveError::Protocol(_))));
}

#[test]
fn test_blob_kind() {
    assert!(EncodedBlob::new(&[], "audio/pcm;rate=24000").is_audio());
    assert!(!EncodedBlob::new(&[], "image/jpeg").is_audio());
}

#[test]
fn test_pcm_rate_parsing() {
    assert_eq!(pcm_rate("audio/pcm;rate=24000"), Some(24_000));
    assert_eq!(pcm_rate("audio/pcm; rate=16000"), Some(16_000));
    assert_eq!(pcm_rate("AUDIO/PCM;RATE=8000"), Some(8_000));
    assert_eq!(pcm_rate("audio/pcm"), None);
    assert_eq!(pcm_rate("image/jpeg"), None);
    assert_eq!(pcm_rate(&pcm_mime(48_000)), Some(48_000));
}

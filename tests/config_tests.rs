use std::time::Duration;

use solo_live::config::{LiveConfig, Personality};
use solo_live::error::LiveError;
use solo_live::kernel::event::{FacingMode, LiveMode};

#[test]
fn test_reference_defaults() {
    let cfg = LiveConfig::default();
    assert_eq!(cfg.input_sample_rate, 16_000);
    assert_eq!(cfg.output_sample_rate, 24_000);
    assert_eq!(cfg.output_channels, 1);
    assert_eq!(cfg.frame_size, 4096);
    assert_eq!(cfg.video_fps, 2);
    assert_eq!(cfg.jpeg_quality, 70);
    assert_eq!(cfg.voice_name, "Zephyr");
    assert_eq!(cfg.frame_interval(), Duration::from_millis(500));
    assert_eq!(cfg.connect_timeout(), Duration::from_secs(15));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_values() {
    let bad = [
        LiveConfig { frame_size: 0, ..LiveConfig::default() },
        LiveConfig { video_fps: 0, ..LiveConfig::default() },
        LiveConfig { jpeg_quality: 0, ..LiveConfig::default() },
        LiveConfig { jpeg_quality: 101, ..LiveConfig::default() },
        LiveConfig { output_channels: 0, ..LiveConfig::default() },
        LiveConfig { input_sample_rate: 0, ..LiveConfig::default() },
        LiveConfig { outbound_capacity: 0, ..LiveConfig::default() },
    ];
    for cfg in bad {
        assert!(matches!(cfg.validate(), Err(LiveError::Config(_))), "{:?}", cfg);
    }
}

#[test]
fn test_mode_specific_setup() {
    let cfg = LiveConfig {
        personality: Personality::Witty,
        ..LiveConfig::default()
    };
    assert_eq!(
        cfg.system_instruction(LiveMode::Voice),
        Personality::Witty.instruction()
    );
    let camera = LiveMode::Camera(FacingMode::User);
    assert!(cfg.system_instruction(camera).contains("camera"));
    assert!(cfg.wants_transcription(camera));
    assert!(!cfg.wants_transcription(LiveMode::Voice));
    assert_eq!(cfg.camera_index(FacingMode::User), 0);
    assert_eq!(cfg.camera_index(FacingMode::Environment), 1);
}

#[test]
fn test_parse_choices() {
    assert_eq!("Formal".parse::<Personality>(), Ok(Personality::Formal));
    assert!("grumpy".parse::<Personality>().is_err());
    assert_eq!("back".parse::<FacingMode>(), Ok(FacingMode::Environment));
    assert_eq!("user".parse::<FacingMode>(), Ok(FacingMode::User));
    assert_eq!(FacingMode::User.flipped(), FacingMode::Environment);
}

// Environment variables are process-wide, so every `load` check lives here.
#[test]
fn test_load_layers_file_then_env() {
    let path = std::env::temp_dir().join(format!("solo-live-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "api_key = \"from-file\"\nvideo_fps = 4\npersonality = \"friendly\"\n",
    )
    .unwrap();

    // 1. File over defaults
    let cfg = LiveConfig::load(Some(&path)).unwrap();
    assert_eq!(cfg.api_key, "from-file");
    assert_eq!(cfg.video_fps, 4);
    assert_eq!(cfg.personality, Personality::Friendly);
    assert_eq!(cfg.frame_size, 4096, "untouched fields keep defaults");

    // 2. Environment over file
    std::env::set_var("SOLO_LIVE__VIDEO_FPS", "5");
    let cfg = LiveConfig::load(Some(&path)).unwrap();
    assert_eq!(cfg.video_fps, 5);

    // 3. Invalid values are rejected at load time
    std::env::set_var("SOLO_LIVE__JPEG_QUALITY", "0");
    assert!(LiveConfig::load(Some(&path)).is_err());

    std::env::remove_var("SOLO_LIVE__VIDEO_FPS");
    std::env::remove_var("SOLO_LIVE__JPEG_QUALITY");
    let _ = std::fs::remove_file(&path);
}

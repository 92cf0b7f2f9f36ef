//! Small helpers for hosts feeding the engine

/// Hop size that keeps the hop around 5-11 ms at common sample rates
pub fn recommended_hop_size(sample_rate: u32) -> usize {
    match sample_rate {
        0..=22_050 => 128,
        22_051..=44_100 => 256,
        44_101..=48_000 => 512,
        48_001..=96_000 => 1024,
        _ => 2048,
    }
}

/// Average interleaved frames into mono
///
/// Writes `min(input.len() / channels, output.len())` samples and returns
/// that count. A trailing partial frame is ignored.
pub fn downmix_interleaved(input: &[f32], channels: usize, output: &mut [f32]) -> usize {
    if channels == 0 {
        return 0;
    }
    let scale = 1.0 / channels as f32;
    let mut written = 0;
    for (frame, out) in input.chunks_exact(channels).zip(output.iter_mut()) {
        *out = frame.iter().sum::<f32>() * scale;
        written += 1;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_hop_size() {
        assert_eq!(recommended_hop_size(8_000), 128);
        assert_eq!(recommended_hop_size(22_050), 128);
        assert_eq!(recommended_hop_size(44_100), 256);
        assert_eq!(recommended_hop_size(48_000), 512);
        assert_eq!(recommended_hop_size(88_200), 1024);
        assert_eq!(recommended_hop_size(96_000), 1024);
        assert_eq!(recommended_hop_size(192_000), 2048);
    }

    #[test]
    fn test_downmix_stereo() {
        let input = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0, 0.25];
        let mut output = [9.0; 4];
        assert_eq!(downmix_interleaved(&input, 2, &mut output), 3);
        assert_eq!(output, [0.5, 0.5, 0.0, 9.0]);
    }

    #[test]
    fn test_downmix_respects_output_len() {
        let input = [0.2; 12];
        let mut output = [0.0; 2];
        assert_eq!(downmix_interleaved(&input, 3, &mut output), 2);
        assert!((output[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_downmix_mono_and_zero_channels() {
        let input = [0.1, 0.2, 0.3];
        let mut output = [0.0; 3];
        assert_eq!(downmix_interleaved(&input, 1, &mut output), 3);
        assert_eq!(output, input);
        assert_eq!(downmix_interleaved(&input, 0, &mut output), 0);
    }
}

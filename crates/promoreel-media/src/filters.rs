//! FFmpeg filter definitions for marketing video assembly.

use std::path::Path;

use promoreel_models::SubtitleStyle;

/// Music level relative to the voiceover.
pub const DEFAULT_MUSIC_VOLUME: f32 = 0.3;

/// ASS force_style for large centered captions.
pub const STYLE_LARGE_CENTERED: &str = concat!(
    "FontName=Arial,FontSize=48,PrimaryColour=&Hffffff,",
    "OutlineColour=&H000000,Outline=2,Alignment=10"
);

/// ASS force_style for plain captions.
pub const STYLE_DEFAULT: &str = "FontName=Arial,FontSize=36,PrimaryColour=&Hffffff";

pub fn subtitle_force_style(style: SubtitleStyle) -> &'static str {
    match style {
        SubtitleStyle::LargeCentered => STYLE_LARGE_CENTERED,
        SubtitleStyle::Default => STYLE_DEFAULT,
    }
}

/// Scale to fit inside the target frame and pad the remainder, centered.
pub fn filter_resize_pad(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    )
}

/// Burn an SRT file into the video.
pub fn filter_subtitles(srt_path: &Path, style: SubtitleStyle) -> String {
    format!(
        "subtitles={}:force_style='{}'",
        escape_filter_path(srt_path),
        subtitle_force_style(style)
    )
}

/// Mix voiceover (input 1) with music (input 2) turned down to `music_volume`.
/// The mixed stream is labelled `[a]`.
pub fn filter_voice_music_mix(music_volume: f32) -> String {
    format!(
        "[2:a]volume={:.2}[music];[1:a][music]amix=inputs=2:duration=longest:dropout_transition=0[a]",
        music_volume
    )
}

/// Escape a path for use as a filtergraph option value.
fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '\\' | ':' | '\'' | ',' | '[' | ']' | ';' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resize_pad_filter() {
        assert_eq!(
            filter_resize_pad(1080, 1920),
            "scale=1080:1920:force_original_aspect_ratio=decrease,pad=1080:1920:(ow-iw)/2:(oh-ih)/2"
        );
    }

    #[test]
    fn test_subtitle_filter_styles() {
        let path = PathBuf::from("/tmp/job/subs.srt");
        let filter = filter_subtitles(&path, SubtitleStyle::LargeCentered);
        assert!(filter.starts_with("subtitles=/tmp/job/subs.srt:force_style='"));
        assert!(filter.contains("FontSize=48"));
        assert!(filter.contains("Alignment=10"));

        let filter = filter_subtitles(&path, SubtitleStyle::Default);
        assert!(filter.contains("FontSize=36"));
        assert!(!filter.contains("Outline"));
    }

    #[test]
    fn test_escape_filter_path() {
        let path = PathBuf::from("C:/it's/subs.srt");
        assert_eq!(escape_filter_path(&path), "C\\:/it\\'s/subs.srt");
    }

    #[test]
    fn test_mix_filter_only_attenuates_music() {
        let filter = filter_voice_music_mix(DEFAULT_MUSIC_VOLUME);
        assert!(filter.starts_with("[2:a]volume=0.30[music]"));
        assert!(filter.contains("[1:a][music]amix=inputs=2:duration=longest"));
        assert!(filter.ends_with("[a]"));
    }
}

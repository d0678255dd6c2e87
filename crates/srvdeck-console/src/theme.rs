use ratatui::style::Color;
use srvdeck_core::color::Hsla;
use srvdeck_core::session::ChannelStatus;

#[derive(Clone, Copy, Debug)]
pub struct DeckTheme {
    pub bg: Color,
    pub surface: Color,
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub selection: Color,
}

pub const BG_RGB: (u8, u8, u8) = (11, 18, 32);

pub fn deck_theme() -> DeckTheme {
    DeckTheme {
        bg: rgb(BG_RGB),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        selection: Color::Rgb(51, 65, 85),
    }
}

/// Line background for an identity color, composited over the console
/// background so the translucent hue reads the same as on a page.
pub fn tint(color: Hsla) -> Color {
    rgb(color.blend_over(BG_RGB))
}

pub fn channel_color(status: ChannelStatus, theme: DeckTheme) -> Color {
    match status {
        ChannelStatus::Connecting => theme.warn,
        ChannelStatus::Connected => theme.ok,
        ChannelStatus::Disconnected => theme.critical,
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}

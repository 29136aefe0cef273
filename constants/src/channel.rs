/// Feature channel naming shared by loaders and consumers

pub struct ChannelInfo {
    pub id: u8,
    pub name: &'static str,
}

pub const CHANNEL_MAP: &[ChannelInfo] = &[
    ChannelInfo {
        id: 0,
        name: "intensity",
    },
    ChannelInfo {
        id: 1,
        name: "red",
    },
    ChannelInfo {
        id: 2,
        name: "green",
    },
    ChannelInfo {
        id: 3,
        name: "blue",
    },
    ChannelInfo {
        id: 4,
        name: "bias",
    },
];

/// Value of the constant bias channel
pub const BIAS_VALUE: f32 = 1.0;

/// Full scale of 16-bit LAS intensity and colour values
pub const U16_FULL_SCALE: f32 = 65535.0;

/// Channels present only when the source carries colour
pub const COLOUR_CHANNEL_IDS: [u8; 3] = [1, 2, 3];

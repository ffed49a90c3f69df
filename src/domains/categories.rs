/// Entities whose pages are mostly watched or listened to.
const VIDEO_ENTITIES: &[&str] = &[
    "youtube.com",
    "vimeo.com",
    "twitch.tv",
    "dailymotion.com",
    "soundcloud.com",
    "mixcloud.com",
    "bandcamp.com",
    "spotify.com",
];

/// Platforms hosting many independent authors. A visit to the platform
/// itself says nothing about which author deserves credit.
const MULTI_AUTHOR_ENTITIES: &[&str] = &[
    "youtube.com",
    "vimeo.com",
    "twitch.tv",
    "dailymotion.com",
    "soundcloud.com",
    "medium.com",
    "substack.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Default,
    Video,
}

impl Category {
    pub fn of(entity: &str, is_audio: bool) -> Self {
        if is_audio || VIDEO_ENTITIES.contains(&entity) {
            Category::Video
        } else {
            Category::Default
        }
    }
}

pub fn is_multi_author(entity: &str) -> bool {
    MULTI_AUTHOR_ENTITIES.contains(&entity)
}

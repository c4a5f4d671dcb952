pub(crate) mod ffmpeg_utils;

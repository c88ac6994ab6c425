use super::constants::*;

pub(crate) fn log_level() -> Option<String> {
    Some(LOG_LEVEL.to_string())
}

pub(crate) fn log_file_path() -> String {
    LOG_FILE_PATH.to_string()
}

pub(crate) fn history_limit() -> usize {
    HISTORY_LIMIT
}

//! User-facing message strings.
//!
//! Kept in one place so the wording can be reviewed (and translated)
//! without touching handler logic. One locale.

/// Label on the share button sent with part 1.
pub const SHARE_BUTTON: &str = "Share";

/// Acknowledgment sent when a reader advances past the last written part.
pub const STORY_FINISHED: &str = "The story is over. Thank you for reading!";

/// Reply to events from ids with no reader record.
pub const NOT_REGISTERED: &str = "You are not registered yet. Send /start to begin.";

/// Title of the inline-share result.
pub const SHARE_TITLE: &str = "My invite link";

/// Greeting sent on every /start.
pub fn greeting(username: &str) -> String {
    format!("Hi, {username}!\nThe story below is where it all starts.")
}

/// Message body for the inline-share result.
pub fn share_message(link: &str) -> String {
    format!("Join the story: {link}")
}

/// Stats display for /stats.
pub fn stats(referrals: u32, progress: u32) -> String {
    format!(
        "Your stats:\nFriends invited: {referrals}\nStory progress: part {progress}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_includes_name() {
        assert!(greeting("alice").contains("alice"));
    }

    #[test]
    fn stats_includes_both_counters() {
        let text = stats(2, 5);
        assert!(text.contains('2'));
        assert!(text.contains('5'));
    }
}

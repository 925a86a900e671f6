use super::super::domain::ProfileStatus;

/// Legal successors of each state. Terminal states have none.
pub const fn successors(status: ProfileStatus) -> &'static [ProfileStatus] {
    match status {
        ProfileStatus::Draft => &[ProfileStatus::Accepted, ProfileStatus::Rejected],
        ProfileStatus::Accepted => &[ProfileStatus::Published, ProfileStatus::Rejected],
        ProfileStatus::Rejected | ProfileStatus::Published => &[],
    }
}

pub fn is_legal(from: ProfileStatus, to: ProfileStatus) -> bool {
    successors(from).contains(&to)
}

pub fn is_terminal(status: ProfileStatus) -> bool {
    successors(status).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProfileStatus; 4] = [
        ProfileStatus::Draft,
        ProfileStatus::Accepted,
        ProfileStatus::Rejected,
        ProfileStatus::Published,
    ];

    #[test]
    fn only_forward_edges_are_legal() {
        let legal = [
            (ProfileStatus::Draft, ProfileStatus::Accepted),
            (ProfileStatus::Draft, ProfileStatus::Rejected),
            (ProfileStatus::Accepted, ProfileStatus::Published),
            (ProfileStatus::Accepted, ProfileStatus::Rejected),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    is_legal(from, to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn draft_cannot_skip_to_published() {
        assert!(!is_legal(ProfileStatus::Draft, ProfileStatus::Published));
    }

    #[test]
    fn rejected_and_published_are_terminal() {
        assert!(is_terminal(ProfileStatus::Rejected));
        assert!(is_terminal(ProfileStatus::Published));
        assert!(!is_terminal(ProfileStatus::Draft));
        assert!(!is_terminal(ProfileStatus::Accepted));
    }
}

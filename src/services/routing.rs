//! Post-send conversation routing: pick the operator who should own the
//! conversation opened by a campaign send.

use uuid::Uuid;

/// Snapshot of one operator bound to a line, with their current load.
#[derive(Debug, Clone)]
pub struct OperatorLoad {
    pub operator_id: Uuid,
    pub online: bool,
    /// Currently open (untabulated) conversations on this line.
    pub open_conversations: i64,
}

/// Pick an assignee among a line's operators: online only, fewest open
/// conversations, ties broken by list order. `None` means no operator is
/// online and the conversation stays system-owned.
pub fn pick_operator(operators: &[OperatorLoad]) -> Option<Uuid> {
    operators
        .iter()
        .filter(|o| o.online)
        .min_by_key(|o| o.open_conversations)
        .map(|o| o.operator_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(online: bool, open: i64) -> OperatorLoad {
        OperatorLoad {
            operator_id: Uuid::new_v4(),
            online,
            open_conversations: open,
        }
    }

    #[test]
    fn test_picks_least_loaded_online() {
        let ops = vec![op(true, 5), op(true, 2), op(true, 9)];
        assert_eq!(pick_operator(&ops), Some(ops[1].operator_id));
    }

    #[test]
    fn test_offline_operators_ignored() {
        let ops = vec![op(false, 0), op(true, 7)];
        assert_eq!(pick_operator(&ops), Some(ops[1].operator_id));
    }

    #[test]
    fn test_none_online_means_system_owned() {
        let ops = vec![op(false, 0), op(false, 1)];
        assert_eq!(pick_operator(&ops), None);
        assert_eq!(pick_operator(&[]), None);
    }

    #[test]
    fn test_tie_breaks_by_list_order() {
        let ops = vec![op(true, 3), op(true, 3), op(true, 3)];
        assert_eq!(pick_operator(&ops), Some(ops[0].operator_id));
    }
}

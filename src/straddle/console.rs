use super::monitor::StraddlePnl;

pub const SETUP_MENU: &str = "[U]p [D]own [F]ire [E]xit";
pub const MANAGE_MENU: &str = "[U]pdate [M]ove top [N] move bottom [E]xit";

/// Choices before the straddles are fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupCommand {
    Up,
    Down,
    Fire,
    Exit,
}

impl SetupCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "U" | "UP" => Some(Self::Up),
            "D" | "DOWN" => Some(Self::Down),
            "F" | "FIRE" => Some(Self::Fire),
            "E" | "EXIT" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Choices while straddles are open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageCommand {
    Update,
    MoveTop,
    MoveBottom,
    Exit,
}

impl ManageCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "U" | "UPDATE" => Some(Self::Update),
            "M" => Some(Self::MoveTop),
            "N" => Some(Self::MoveBottom),
            "E" | "EXIT" => Some(Self::Exit),
            _ => None,
        }
    }
}

pub fn format_strikes(strikes: &[i64]) -> String {
    strikes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" / ")
}

/// P&L table, one row per straddle plus a total
pub fn format_pnl_table(rows: &[StraddlePnl]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>8} | {:>10} | {:>10} | {:>10}",
        "Strike", "CE P&L", "PE P&L", "Total"
    )];

    let leg = |pnl: Option<f64>| match pnl {
        Some(v) => format!("{:>10.2}", v),
        None => format!("{:>10}", "-"),
    };

    for row in rows {
        lines.push(format!(
            "{:>8} | {} | {} | {:>10.2}",
            row.strike,
            leg(row.call.as_ref().map(|l| l.pnl)),
            leg(row.put.as_ref().map(|l| l.pnl)),
            row.total()
        ));
    }

    let total: f64 = rows.iter().map(StraddlePnl::total).sum();
    lines.push(format!("{:>8} | {:>10} | {:>10} | {:>10.2}", "ALL", "", "", total));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::straddle::monitor::LegPnl;

    #[test]
    fn test_setup_commands_case_insensitive() {
        assert_eq!(SetupCommand::parse("u"), Some(SetupCommand::Up));
        assert_eq!(SetupCommand::parse(" D\n"), Some(SetupCommand::Down));
        assert_eq!(SetupCommand::parse("f"), Some(SetupCommand::Fire));
        assert_eq!(SetupCommand::parse("exit"), Some(SetupCommand::Exit));
        assert_eq!(SetupCommand::parse("x"), None);
    }

    #[test]
    fn test_manage_commands() {
        assert_eq!(ManageCommand::parse("U"), Some(ManageCommand::Update));
        assert_eq!(ManageCommand::parse("m"), Some(ManageCommand::MoveTop));
        assert_eq!(ManageCommand::parse("n"), Some(ManageCommand::MoveBottom));
        assert_eq!(ManageCommand::parse("e"), Some(ManageCommand::Exit));
        assert_eq!(ManageCommand::parse(""), None);
    }

    #[test]
    fn test_pnl_table_totals() {
        let leg = |pnl| LegPnl {
            security_id: "1".to_string(),
            entry_price: 0.0,
            current_price: 0.0,
            short_quantity: 20.0,
            pnl,
        };
        let rows = vec![
            StraddlePnl { strike: 74_900, call: Some(leg(100.0)), put: Some(leg(-40.0)) },
            StraddlePnl { strike: 75_000, call: None, put: Some(leg(15.5)) },
        ];

        let lines = format_pnl_table(&rows);

        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("60.00"));
        assert!(lines[2].contains('-'));
        assert!(lines[3].contains("75.50"));
        assert_eq!(format_strikes(&[74_900, 75_000]), "74900 / 75000");
    }
}

use super::*;

#[test]
fn prices_keep_precision_for_small_values() {
    assert_eq!(format_price(43_210.456), "$43210.46");
    assert_eq!(format_price(0.000123), "$0.000123");
}

#[test]
fn changes_are_signed() {
    assert_eq!(format_change(Some(1.234)), "+1.23%");
    assert_eq!(format_change(Some(-0.5)), "-0.50%");
    assert_eq!(format_change(None), "n/a");
}

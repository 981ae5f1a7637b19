//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::ports::PortError;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Unknown invoice status 'LOST'");

    match error {
        CoreError::Validation(msg) => assert!(msg.contains("LOST")),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::UnknownCurrency("XYZ".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("XYZ"));
}

#[test]
fn test_core_error_from_port_error() {
    let core_error: CoreError = PortError::not_found("Invoice", "INV-3").into();

    match core_error {
        CoreError::Port(inner) => assert!(inner.is_not_found()),
        _ => panic!("Expected Port error"),
    }
}

#[test]
fn test_core_error_display() {
    let error = CoreError::validation("Test error");
    let display = format!("{}", error);

    assert!(display.contains("Validation error"));
}

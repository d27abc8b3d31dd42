//! Tests for error handling

use ferros_expr::ast::{AstId, DeclId, DeclKindTag};
use ferros_expr::error::{ExprError, ExprResult};

#[test]
fn test_not_found_display()
{
    let error = ExprError::NotFound("Point".to_string());
    assert!(format!("{error}").contains("Point"));
}

#[test]
fn test_resolution_failure_display()
{
    let error = ExprError::ResolutionFailure {
        decl: DeclId::from_raw(7),
        reason: "origin store ast#3 has been destroyed".to_string(),
    };
    let message = format!("{error}");
    assert!(message.contains("destroyed"));
    assert!(message.contains('7'));
}

#[test]
fn test_import_failure_display()
{
    let error = ExprError::ImportFailure {
        kind: DeclKindTag::UsingDirective,
        name: String::new(),
    };
    assert!(format!("{error}").contains("UsingDirective"));
}

#[test]
fn test_unknown_context_display()
{
    let error = ExprError::UnknownContext(AstId::from_raw(12));
    assert!(format!("{error}").contains("ast#12"));
}

#[test]
fn test_recoverable_errors()
{
    assert!(ExprError::NotFound(String::new()).is_recoverable());
    assert!(ExprError::ImportFailure {
        kind: DeclKindTag::Label,
        name: "retry".to_string(),
    }
    .is_recoverable());
    assert!(!ExprError::UnknownContext(AstId::from_raw(0)).is_recoverable());
    assert!(!ExprError::Dwarf("truncated unit".to_string()).is_recoverable());
}

#[test]
fn test_io_error_conversion()
{
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let error: ExprError = io_err.into();
    match error {
        ExprError::Io(_) => {
            // Expected: io::Error converts through #[from]
        }
        _ => panic!("Expected Io variant"),
    }
}

#[test]
fn test_result_type_alias()
{
    fn fails() -> ExprResult<()>
    {
        Err(ExprError::InvalidArgument("empty name".to_string()))
    }

    assert!(matches!(fails(), Err(ExprError::InvalidArgument(_))));
}

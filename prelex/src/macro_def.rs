use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// The definition table: macro name to definition, later definitions
/// overwriting earlier ones
pub(crate) type MacroTable = HashMap<Rc<str>, MacroDef>;

/// Variadic flavor of a function-style macro
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variadic {
    /// Fixed parameter list
    None,
    /// Trailing `...`, bound to `__VA_ARGS__`
    Standard,
    /// GNU `name...`, bound to the named parameter
    Gnu,
}

/// Environment handed to dynamic macros at expansion time
#[derive(Clone, Debug)]
pub struct ExpansionEnv {
    /// Identity of the nearest enclosing file buffer
    pub file: Rc<str>,
    /// Line number at the expansion point within that buffer
    pub line: u32,
}

/// Type alias for the callback computing a dynamic object-style macro
pub type DynamicObjectHandler = Rc<dyn Fn(&ExpansionEnv) -> String>;

/// Type alias for the callback computing a dynamic function-style macro;
/// arguments arrive fully macro-expanded
pub type DynamicFunctionHandler = Rc<dyn Fn(&ExpansionEnv, &[String]) -> String>;

/// A macro definition
///
/// For the variadic flavors the parameter list includes the variadic
/// parameter itself as its last entry: `__VA_ARGS__` for [`Variadic::Standard`]
/// and the declared name for [`Variadic::Gnu`].
#[derive(Clone)]
pub enum MacroDef {
    /// `#define NAME replacement`
    Object {
        /// Replacement text, comments stripped, escaped newlines elided
        replacement: Rc<str>,
    },
    /// `#define NAME(params) replacement`
    Function {
        /// Declared parameter names
        parameters: Rc<[String]>,
        /// Replacement text, comments stripped, escaped newlines elided
        replacement: Rc<str>,
        /// Variadic flavor
        variadic: Variadic,
    },
    /// Built-in whose replacement is computed at expansion time
    DynamicObject {
        /// Computes the replacement text
        compute: DynamicObjectHandler,
    },
    /// Built-in function-style macro computed at expansion time
    DynamicFunction {
        /// Declared parameter names
        parameters: Rc<[String]>,
        /// Variadic flavor
        variadic: Variadic,
        /// Computes the replacement text from the bound arguments
        compute: DynamicFunctionHandler,
    },
}

impl MacroDef {
    /// Whether an invocation requires a parenthesized argument list
    #[must_use]
    pub fn is_function_style(&self) -> bool {
        matches!(
            self,
            MacroDef::Function { .. } | MacroDef::DynamicFunction { .. }
        )
    }

    /// Declared parameters for the function-style flavors
    #[must_use]
    pub fn parameters(&self) -> Option<&[String]> {
        match self {
            MacroDef::Function { parameters, .. } | MacroDef::DynamicFunction { parameters, .. } => {
                Some(parameters)
            }
            _ => None,
        }
    }

    /// Variadic flavor; [`Variadic::None`] for object-style macros
    #[must_use]
    pub fn variadic(&self) -> Variadic {
        match self {
            MacroDef::Function { variadic, .. } | MacroDef::DynamicFunction { variadic, .. } => {
                *variadic
            }
            _ => Variadic::None,
        }
    }

    /// Number of arguments an invocation must supply at minimum
    ///
    /// The variadic parameter does not count: `LOG(fmt, ...)` requires one.
    #[must_use]
    pub fn required_argument_count(&self) -> usize {
        match self.parameters() {
            Some(params) => match self.variadic() {
                Variadic::None => params.len(),
                Variadic::Standard | Variadic::Gnu => params.len().saturating_sub(1),
            },
            None => 0,
        }
    }
}

impl fmt::Debug for MacroDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroDef::Object { replacement } => {
                f.debug_struct("Object").field("replacement", replacement).finish()
            }
            MacroDef::Function {
                parameters,
                replacement,
                variadic,
            } => f
                .debug_struct("Function")
                .field("parameters", parameters)
                .field("replacement", replacement)
                .field("variadic", variadic)
                .finish(),
            MacroDef::DynamicObject { .. } => f.write_str("DynamicObject"),
            MacroDef::DynamicFunction { parameters, variadic, .. } => f
                .debug_struct("DynamicFunction")
                .field("parameters", parameters)
                .field("variadic", variadic)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(params: &[&str], variadic: Variadic) -> MacroDef {
        MacroDef::Function {
            parameters: params.iter().map(|p| p.to_string()).collect(),
            replacement: Rc::from(""),
            variadic,
        }
    }

    #[test]
    fn required_argument_counts() {
        assert_eq!(function(&["a", "b"], Variadic::None).required_argument_count(), 2);
        assert_eq!(
            function(&["fmt", "__VA_ARGS__"], Variadic::Standard).required_argument_count(),
            1
        );
        assert_eq!(function(&["args"], Variadic::Gnu).required_argument_count(), 0);
        assert_eq!(
            MacroDef::Object { replacement: Rc::from("1") }.required_argument_count(),
            0
        );
    }
}

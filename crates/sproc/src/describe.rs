//! Contract descriptions
//!
//! A contract is described once, as plain data, before anything is compiled.
//! The `contract!` and `record!` macros produce these descriptions from Rust
//! declarations; they can also be built by hand for contracts that are not
//! declared through the macros.

use sproc_core::DbType;

/// Schema used for procedures and table types that do not name one
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Attribute marking a trailing `&mut i32` parameter as the return-value channel
pub const RETURN_VALUE_ATTRIBUTE: &str = "return_value";

/// Shape of a Rust type as seen by the analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    /// `()`
    Unit,
    /// A single bindable value
    Scalar {
        db_type: DbType,
        name: &'static str,
        nullable: bool,
    },
    /// A flat record whose members are scalars
    Record(RecordDesc),
    /// `Vec<T>`
    Sequence(Box<TypeDesc>),
    /// `(A, B, ..)`
    Tuple(Vec<TypeDesc>),
    /// Anything else, kept by name for diagnostics
    Other(String),
}

impl TypeDesc {
    pub fn scalar(db_type: DbType, name: &'static str) -> Self {
        TypeDesc::Scalar {
            db_type,
            name,
            nullable: false,
        }
    }

    pub fn sequence(element: TypeDesc) -> Self {
        TypeDesc::Sequence(Box::new(element))
    }

    /// Whether this is a non-nullable `i32`
    pub fn is_return_code(&self) -> bool {
        matches!(
            self,
            TypeDesc::Scalar {
                db_type: DbType::Int32,
                nullable: false,
                ..
            }
        )
    }

    /// Render the type for error messages
    pub fn display_name(&self) -> String {
        match self {
            TypeDesc::Unit => "()".to_string(),
            TypeDesc::Scalar { name, nullable, .. } => {
                if *nullable {
                    format!("Option<{}>", name)
                } else {
                    name.to_string()
                }
            }
            TypeDesc::Record(record) => record.type_name.clone(),
            TypeDesc::Sequence(inner) => format!("Vec<{}>", inner.display_name()),
            TypeDesc::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|t| t.display_name()).collect();
                format!("({})", inner.join(", "))
            }
            TypeDesc::Other(name) => name.clone(),
        }
    }
}

/// Server-side table type, rendered `[schema].[name]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableTypeName {
    pub schema: String,
    pub name: String,
}

impl TableTypeName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}].[{}]", self.schema, self.name)
    }
}

/// One member of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub db_type: DbType,
    pub nullable: bool,
}

/// Description of a flat record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDesc {
    pub type_name: String,
    /// Members in declaration order
    pub columns: Vec<ColumnDesc>,
    /// Present when the record is annotated as a table type
    pub table_type: Option<TableTypeName>,
    /// First unrecognised table-type annotation key, if any
    pub invalid_annotation: Option<String>,
}

impl RecordDesc {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            columns: Vec::new(),
            table_type: None,
            invalid_annotation: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>, db_type: DbType, nullable: bool) -> Self {
        self.columns.push(ColumnDesc {
            name: name.into(),
            db_type,
            nullable,
        });
        self
    }

    /// Apply `#[table_type(name = .., schema = ..)]` key/value pairs.
    ///
    /// An empty attribute list leaves the record without a table type.
    pub fn table_type_attrs(mut self, attrs: &[(&str, &str)]) -> Self {
        if attrs.is_empty() {
            return self;
        }
        let mut schema = DEFAULT_SCHEMA.to_string();
        let mut name = self.type_name.clone();
        for (key, value) in attrs {
            match *key {
                "name" => name = value.to_string(),
                "schema" => schema = value.to_string(),
                other => {
                    if self.invalid_annotation.is_none() {
                        self.invalid_annotation = Some(other.to_string());
                    }
                }
            }
        }
        self.table_type = Some(TableTypeName::new(schema, name));
        self
    }

    pub fn table_type(mut self, table_type: TableTypeName) -> Self {
        self.table_type = Some(table_type);
        self
    }
}

/// How a parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassingMode {
    /// Passed by value
    Value,
    /// Passed as `&mut T`; the method writes the server's value back
    Reference,
}

/// Declared shape of one method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSignature {
    pub name: String,
    pub ty: TypeDesc,
    pub mode: PassingMode,
    pub attributes: Vec<String>,
}

impl ParamSignature {
    pub fn new(name: impl Into<String>, ty: TypeDesc, mode: PassingMode) -> Self {
        Self {
            name: name.into(),
            ty,
            mode,
            attributes: Vec::new(),
        }
    }

    /// Describe parameter `name` from its Rust type
    pub fn of<T: crate::ParamType + ?Sized>(name: &str) -> Self {
        let (ty, mode) = T::param_desc();
        Self::new(name, ty, mode)
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

/// Declared shape of one contract method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ParamSignature>,
    pub returns: TypeDesc,
    pub is_async: bool,
    /// `#[procedure(..)]` key/value pairs in declaration order
    pub annotations: Vec<(String, String)>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, returns: TypeDesc) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns,
            is_async: false,
            annotations: Vec::new(),
        }
    }

    pub fn asynchronous(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn param(mut self, param: ParamSignature) -> Self {
        self.params.push(param);
        self
    }

    pub fn annotate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.push((key.into(), value.into()));
        self
    }
}

/// Whether a contract can be proxied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    /// A trait; every method is forwarded to a procedure
    Interface,
    /// A concrete type; not supported
    Concrete,
}

/// Full description of a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDescription {
    pub name: String,
    pub kind: ContractKind,
    pub methods: Vec<MethodSignature>,
}

impl ContractDescription {
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ContractKind::Interface,
            methods: Vec::new(),
        }
    }

    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ContractKind::Concrete,
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }
}

/// A type that can be turned into a proxy.
///
/// Implemented for `dyn Trait` by `contract!`.
pub trait Contract: 'static {
    fn describe() -> ContractDescription;
}

//! Declaration macros for contracts and records

/// Declare a stored-procedure contract.
///
/// Expands to the trait itself, a [`Contract`](crate::Contract) description
/// for `dyn Trait`, and an implementation of the trait for
/// [`Proxy<dyn Trait>`](crate::Proxy) forwarding every method to the executor.
///
/// ```ignore
/// sproc::contract! {
///     pub trait Orders {
///         fn get_orders(&self, customer: i32) -> Vec<Order>;
///         #[procedure(name = "usp_CountOrders", schema = "sales")]
///         fn count(&self, total: &mut i32);
///         async fn archive_async(&self, before: NaiveDate) -> i32;
///     }
/// }
/// ```
#[macro_export]
macro_rules! contract {
    (
        $(#[$tattr:meta])*
        $vis:vis trait $name:ident {
            $($body:tt)*
        }
    ) => {
        $crate::__contract_parse! {
            @header [$(#[$tattr])*] [$vis] [$name]
            @methods []
            @annotations []
            @docs []
            $($body)*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_parse {
    (
        @header $header:tt $vis:tt $name:tt
        @methods $methods:tt
        @annotations [$($anno:tt)*]
        @docs $docs:tt
        #[procedure($($key:ident = $val:literal),* $(,)?)]
        $($rest:tt)*
    ) => {
        $crate::__contract_parse! {
            @header $header $vis $name
            @methods $methods
            @annotations [$($anno)* $($key = $val;)*]
            @docs $docs
            $($rest)*
        }
    };

    (
        @header $header:tt $vis:tt $name:tt
        @methods $methods:tt
        @annotations $annos:tt
        @docs [$($doc:tt)*]
        #[doc = $text:expr]
        $($rest:tt)*
    ) => {
        $crate::__contract_parse! {
            @header $header $vis $name
            @methods $methods
            @annotations $annos
            @docs [$($doc)* #[doc = $text]]
            $($rest)*
        }
    };

    (
        @header $header:tt $vis:tt $name:tt
        @methods [$($methods:tt)*]
        @annotations $annos:tt
        @docs $docs:tt
        async fn $method:ident(&self $(, $(#[$pattr:ident])* $arg:ident : $argty:ty)*) $(-> $ret:ty)?;
        $($rest:tt)*
    ) => {
        $crate::__contract_parse! {
            @header $header $vis $name
            @methods [$($methods)* {
                asynchronous $method $annos $docs
                [$([$($pattr)*] $arg : $argty),*]
                [$crate::__contract_ret!($($ret)?)]
            }]
            @annotations []
            @docs []
            $($rest)*
        }
    };

    (
        @header $header:tt $vis:tt $name:tt
        @methods [$($methods:tt)*]
        @annotations $annos:tt
        @docs $docs:tt
        fn $method:ident(&self $(, $(#[$pattr:ident])* $arg:ident : $argty:ty)*) $(-> $ret:ty)?;
        $($rest:tt)*
    ) => {
        $crate::__contract_parse! {
            @header $header $vis $name
            @methods [$($methods)* {
                sync $method $annos $docs
                [$([$($pattr)*] $arg : $argty),*]
                [$crate::__contract_ret!($($ret)?)]
            }]
            @annotations []
            @docs []
            $($rest)*
        }
    };

    (
        @header [$($tattr:tt)*] [$vis:vis] [$name:ident]
        @methods [$({ $kind:ident $method:ident $annos:tt $docs:tt $params:tt [$ret:ty] })*]
        @annotations []
        @docs []
    ) => {
        $($tattr)*
        $vis trait $name: ::std::marker::Send + ::std::marker::Sync {
            $($crate::__contract_method! { @trait_item $kind $method $docs $params [$ret] })*
        }

        impl $crate::Contract for dyn $name {
            fn describe() -> $crate::ContractDescription {
                $crate::ContractDescription::interface(::std::stringify!($name))
                    $(.method($crate::__contract_method! { @describe $kind $method $annos $params [$ret] }))*
            }
        }

        impl $name for $crate::Proxy<dyn $name> {
            $($crate::__contract_method! { @forward $kind $method $params [$ret] })*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_ret {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_method {
    (@trait_item sync $method:ident [$($doc:tt)*] [$([$($pattr:ident)*] $arg:ident : $argty:ty),*] [$ret:ty]) => {
        $($doc)*
        fn $method(&self $(, $arg: $argty)*) -> $crate::Result<$ret>;
    };

    (@trait_item asynchronous $method:ident [$($doc:tt)*] [$([$($pattr:ident)*] $arg:ident : $argty:ty),*] [$ret:ty]) => {
        $($doc)*
        fn $method(&self $(, $arg: $argty)*) -> $crate::BoxFuture<'_, $crate::Result<$ret>>;
    };

    (@describe $kind:ident $method:ident [$($key:ident = $val:literal;)*] [$([$($pattr:ident)*] $arg:ident : $argty:ty),*] [$ret:ty]) => {
        $crate::MethodSignature::new(
            ::std::stringify!($method),
            <$ret as $crate::SqlType>::describe(),
        )
        .asynchronous($crate::__contract_method!(@is_async $kind))
        $(.annotate(::std::stringify!($key), $val))*
        $(.param(
            $crate::ParamSignature::of::<$argty>(::std::stringify!($arg))
                $(.attribute(::std::stringify!($pattr)))*
        ))*
    };

    (@is_async sync) => { false };
    (@is_async asynchronous) => { true };

    (@forward sync $method:ident [$([$($pattr:ident)*] $arg:ident : $argty:ty),*] [$ret:ty]) => {
        fn $method(&self $(, $arg: $argty)*) -> $crate::Result<$ret> {
            let args = ::std::vec![$($crate::Argument::into_arg($arg)),*];
            self.invoke::<$ret>(::std::stringify!($method), args)
        }
    };

    (@forward asynchronous $method:ident [$([$($pattr:ident)*] $arg:ident : $argty:ty),*] [$ret:ty]) => {
        fn $method(&self $(, $arg: $argty)*) -> $crate::BoxFuture<'_, $crate::Result<$ret>> {
            let args: ::std::vec::Vec<$crate::Arg<'static>> =
                ::std::vec![$($crate::Argument::into_detached($arg)),*];
            ::std::boxed::Box::pin(async move {
                self.invoke_async::<$ret>(::std::stringify!($method), args).await
            })
        }
    };
}

/// Declare a flat record usable as a complex input, a table-valued parameter
/// row or a result row.
///
/// ```ignore
/// sproc::record! {
///     #[table_type(name = "OrderLineList", schema = "sales")]
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct OrderLine {
///         pub sku: String,
///         pub quantity: i32,
///     }
/// }
/// ```
///
/// Members bind and decode by field name, matched case-insensitively.
#[macro_export]
macro_rules! record {
    (
        #[table_type($($tkey:ident = $tval:literal),* $(,)?)]
        $($rest:tt)*
    ) => {
        $crate::__record_impl! { [$(($tkey, $tval))*] $($rest)* }
    };

    ($($rest:tt)*) => {
        $crate::__record_impl! { [] $($rest)* }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_impl {
    (
        [$(($tkey:ident, $tval:literal))*]
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $($(#[$fattr:meta])* $fvis:vis $field:ident : $fty:ty),* $(,)?
        }
    ) => {
        $(#[$attr])*
        $vis struct $name {
            $($(#[$fattr])* $fvis $field: $fty),*
        }

        impl $crate::Record for $name {
            fn record_desc() -> $crate::RecordDesc {
                $crate::RecordDesc::new(::std::stringify!($name))
                    $(.column(
                        ::std::stringify!($field),
                        <$fty as $crate::Scalar>::db_type(),
                        <$fty as $crate::Scalar>::nullable(),
                    ))*
                    .table_type_attrs(&[$((::std::stringify!($tkey), $tval)),*])
            }

            fn to_values(&self) -> ::std::vec::Vec<$crate::Value> {
                ::std::vec![$($crate::Scalar::to_value(&self.$field)),*]
            }
        }

        impl $crate::SqlType for $name {
            fn describe() -> $crate::TypeDesc {
                $crate::TypeDesc::Record(<$name as $crate::Record>::record_desc())
            }
        }

        impl $crate::ParamType for $name {
            fn param_desc() -> ($crate::TypeDesc, $crate::PassingMode) {
                (<$name as $crate::SqlType>::describe(), $crate::PassingMode::Value)
            }
        }

        impl<'a> $crate::Argument<'a> for $name {
            fn into_arg(self) -> $crate::Arg<'a> {
                $crate::Arg::Members($crate::Record::to_values(&self))
            }

            fn into_detached(self) -> $crate::Arg<'static> {
                $crate::Arg::Members($crate::Record::to_values(&self))
            }
        }

        impl $crate::FromRow for $name {
            fn from_row(
                values: ::std::vec::Vec<$crate::Value>,
            ) -> ::std::result::Result<Self, $crate::DecodeError> {
                const WIDTH: usize = <[&str]>::len(&[$(::std::stringify!($field)),*]);
                if values.len() != WIDTH {
                    return ::std::result::Result::Err($crate::DecodeError::RowWidth {
                        expected: WIDTH,
                        found: values.len(),
                    });
                }
                let mut values = values.into_iter();
                ::std::result::Result::Ok(Self {
                    $($field: $crate::Scalar::from_value(
                        values.next().unwrap_or($crate::Value::Null),
                        ::std::stringify!($field),
                    )?,)*
                })
            }
        }
    };
}

//! Debug rendering of synthesized trees. The output is for inspection and
//! snapshot tests; it is not a source language.

use crate::expr::{ElementCodec, Expr, MarshalOp, Stmt, UnmarshalOp};
use crate::method::{
    MethodKind, SynthesizedCallback, SynthesizedMethod, SynthesizedStruct, SynthesizedType, ValueType,
};
use std::fmt::{self, Display, Formatter, Write};

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Native(carrier) => write!(f, "{}", carrier),
            ValueType::Bool => f.write_str("boolean"),
            ValueType::Text => f.write_str("text"),
            ValueType::Array(element) => write!(f, "{}[]", element),
            ValueType::Enum(name) | ValueType::Struct(name) | ValueType::Callback(name) | ValueType::Custom(name) => {
                write!(f, "{}", name)
            }
            ValueType::Variadic(element) => write!(f, "{}...", element),
        }
    }
}

impl Display for ElementCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ElementCodec::Scalar(carrier) => write!(f, "{}", carrier),
            ElementCodec::Bool(carrier) => write!(f, "bool as {}", carrier),
            ElementCodec::Enum { ty, carrier } => write!(f, "{} as {}", ty, carrier),
            ElementCodec::Struct { ty, .. } => write!(f, "struct {}", ty),
            ElementCodec::Text(charset) => write!(f, "text {}", charset),
            ElementCodec::Callback(ty) => write!(f, "callback {}", ty),
            ElementCodec::Array(inner) => write!(f, "array<{}>", inner),
        }
    }
}

impl Display for MarshalOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MarshalOp::BoolToInt(carrier) => write!(f, "bool_to<{}>", carrier),
            MarshalOp::EnumToInt { ty, carrier } => write!(f, "enum_to<{} as {}>", ty, carrier),
            MarshalOp::EncodeText { charset, capacity: None } => write!(f, "encode<{}>", charset),
            MarshalOp::EncodeText { charset, capacity: Some(n) } => write!(f, "encode<{}; {}>", charset, n),
            MarshalOp::ArrayToNative { element, capacity: None } => write!(f, "array_to<{}>", element),
            MarshalOp::ArrayToNative { element, capacity: Some(n) } => write!(f, "array_to<{}; {}>", element, n),
            MarshalOp::PackVariadic { element } => write!(f, "pack<{}>", element),
            MarshalOp::StructAddress { ty } => write!(f, "address_of<{}>", ty),
            MarshalOp::StructBytes { ty } => write!(f, "bytes_of<{}>", ty),
            MarshalOp::CallbackStub { ty } => write!(f, "stub<{}>", ty),
        }
    }
}

impl Display for UnmarshalOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnmarshalOp::IntToBool => f.write_str("to_bool"),
            UnmarshalOp::IntToEnum { ty } => write!(f, "to_enum<{}>", ty),
            UnmarshalOp::DecodeText { charset } => write!(f, "decode<{}>", charset),
            UnmarshalOp::ArrayFromNative { element } => write!(f, "array_from<{}>", element),
            UnmarshalOp::WrapStruct { ty } => write!(f, "wrap<{}>", ty),
            UnmarshalOp::StructFromBytes { ty } => write!(f, "from_bytes<{}>", ty),
            UnmarshalOp::WrapCallback { ty } => write!(f, "wrap_callback<{}>", ty),
        }
    }
}

fn write_args(f: &mut Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(name) => f.write_str(name),
            Expr::Local(name) => write!(f, "${}", name),
            Expr::Const(value) => write!(f, "{}", value),
            Expr::Null => f.write_str("null"),
            Expr::Symbol(entry_point) => write!(f, "&{}", entry_point),
            Expr::ArrayLength(value) => write!(f, "length({})", value),
            Expr::IntCast { value, to } => write!(f, "({} as {})", value, to),
            Expr::Marshal { value, op } => write!(f, "{}({})", op, value),
            Expr::Unmarshal { value, op, length: None } => write!(f, "{}({})", op, value),
            Expr::Unmarshal { value, op, length: Some(length) } => write!(f, "{}({}, {})", op, value, length),
            Expr::CallRaw { method, args } => {
                write!(f, "self.{}(", method)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::CallNative { entry_point, signature, args, critical } => {
                write!(f, "{}[{}{}](", if *critical { "critical " } else { "native " }, entry_point, signature)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::CallAddress { address, signature, args } => {
                write!(f, "call_ptr[{}{}](", address, signature)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::InvokeHost { callback, args } => {
                write!(f, "{}.invoke(", callback)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::CallHelper { name, args } => {
                write!(f, "helper {}(", name)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::CustomBody { name, args } => {
                write!(f, "body {}(", name)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::FieldAddress { base, offset, indices } => {
                write!(f, "({} + {}", base, offset)?;
                for index in indices {
                    write!(f, " + {} * {}", index.index, index.step.stride)?;
                }
                f.write_str(")")
            }
            Expr::Load { address, carrier } => write!(f, "load<{}>{}", carrier, address),
        }
    }
}

struct Printer<'a, 'b> {
    out: &'a mut Formatter<'b>,
    indent: usize,
}

impl Printer<'_, '_> {
    fn line(&mut self, text: fmt::Arguments<'_>) -> fmt::Result {
        for _ in 0..self.indent {
            self.out.write_str("    ")?;
        }
        self.out.write_fmt(text)?;
        self.out.write_char('\n')
    }

    fn block(&mut self, head: fmt::Arguments<'_>, body: &[Stmt]) -> fmt::Result {
        self.line(format_args!("{} {{", head))?;
        self.indent += 1;
        self.stmts(body)?;
        self.indent -= 1;
        self.line(format_args!("}}"))
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> fmt::Result {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        match stmt {
            Stmt::Let { name, value } => self.line(format_args!("let ${} = {};", name, value)),
            Stmt::Eval(expr) => self.line(format_args!("{};", expr)),
            Stmt::CheckFixedSize { param, value, expected } => {
                self.line(format_args!("check_size {} == {} ({});", value, expected, param))
            }
            Stmt::CheckNotNull { param, value } => self.line(format_args!("check_not_null {} ({});", value, param)),
            Stmt::WithFrame(body) => self.block(format_args!("with_frame"), body),
            Stmt::TryFinally { body, finally } => {
                self.block(format_args!("try"), body)?;
                self.block(format_args!("finally"), finally)
            }
            Stmt::WriteBack { host, native, op } => {
                self.line(format_args!("write_back {} <- {}({});", host, op, native))
            }
            Stmt::IfNotNull { value, then } => self.block(format_args!("if_not_null {}", value), then),
            Stmt::Store { address, value } => self.line(format_args!("store {} <- {};", address, value)),
            Stmt::CopyBytes { from, to, size } => self.line(format_args!("copy {} <- {} ({} bytes);", to, from, size)),
            Stmt::Return(None) => self.line(format_args!("return;")),
            Stmt::Return(Some(value)) => self.line(format_args!("return {};", value)),
        }
    }

    fn method(&mut self, method: &SynthesizedMethod) -> fmt::Result {
        if let Some(doc) = &method.documentation {
            for line in doc.lines() {
                self.line(format_args!("/// {}", line))?;
            }
        }
        let mut signature = String::new();
        for (i, param) in method.params.iter().enumerate() {
            if i > 0 {
                signature.push_str(", ");
            }
            if param.nullable {
                signature.push('?');
            }
            let _ = write!(signature, "{} {}", param.ty, param.name);
        }
        let kind = match method.kind {
            MethodKind::Raw => "raw",
            MethodKind::Overload => "overload",
            MethodKind::Getter => "get",
            MethodKind::Setter => "set",
            MethodKind::CallbackProxy => "proxy",
            MethodKind::CallbackTrampoline => "trampoline",
        };
        let optional = if method.optional { " optional" } else { "" };
        self.block(
            format_args!("{} {}{} {} {}({})", method.access, kind, optional, method.returns, method.name, signature),
            &method.body,
        )
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Printer { out: f, indent: 0 }.stmt(self)
    }
}

impl Display for SynthesizedMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Printer { out: f, indent: 0 }.method(self)
    }
}

impl Display for SynthesizedType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut p = Printer { out: f, indent: 0 };
        p.line(format_args!("type {} (library {}) {{", self.name, self.library.library))?;
        p.indent += 1;
        for symbol in &self.symbols {
            let optional = if symbol.optional { "optional " } else { "" };
            p.line(format_args!("{}symbol {}{};", optional, symbol.entry_point, symbol.signature))?;
        }
        for method in &self.methods {
            p.method(method)?;
        }
        p.indent -= 1;
        p.line(format_args!("}}"))
    }
}

impl Display for SynthesizedStruct {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut p = Printer { out: f, indent: 0 };
        p.line(format_args!("struct {} (size {}, align {}) {{", self.name, self.size, self.align))?;
        p.indent += 1;
        for accessor in &self.accessors {
            p.method(&accessor.getter)?;
            if let Some(setter) = &accessor.setter {
                p.method(setter)?;
            }
        }
        p.indent -= 1;
        p.line(format_args!("}}"))
    }
}

impl Display for SynthesizedCallback {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut p = Printer { out: f, indent: 0 };
        p.line(format_args!("callback {}{} {{", self.name, self.signature))?;
        p.indent += 1;
        p.method(&self.proxy)?;
        p.method(&self.trampoline)?;
        p.indent -= 1;
        p.line(format_args!("}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FieldIndex;
    use crate::method::Param;
    use bindweave_layout::{Carrier, IndexStep, NativeSignature};
    use bindweave_meta::{AccessLevel, Charset};
    use expect_test::expect;

    #[test]
    fn renders_overload_body() {
        let method = SynthesizedMethod {
            name: "greet".to_string(),
            kind: MethodKind::Overload,
            access: AccessLevel::Public,
            params: vec![Param::new("name", ValueType::Text)],
            returns: ValueType::Native(Carrier::I32),
            body: vec![Stmt::WithFrame(vec![
                Stmt::CheckNotNull { param: "name".to_string(), value: Expr::param("name") },
                Stmt::Let {
                    name: "name".to_string(),
                    value: Expr::param("name")
                        .marshal(MarshalOp::EncodeText { charset: Charset::Utf8, capacity: None }),
                },
                Stmt::Return(Some(Expr::CallRaw { method: "ngreet".to_string(), args: vec![Expr::local("name")] })),
            ])],
            documentation: Some("Says hello.".to_string()),
            entry_point: Some("greet".to_string()),
            optional: false,
        };

        expect![[r#"
            /// Says hello.
            public overload i32 greet(text name) {
                with_frame {
                    check_not_null name (name);
                    let $name = encode<utf8>(name);
                    return self.ngreet($name);
                }
            }
        "#]]
        .assert_eq(&method.to_string());
    }

    #[test]
    fn renders_indexed_field_load() {
        let load = Expr::Load {
            address: Box::new(Expr::FieldAddress {
                base: Box::new(Expr::param("this")),
                offset: 12,
                indices: vec![FieldIndex { index: Expr::param("i0"), step: IndexStep { stride: 8, length: 3 } }],
            }),
            carrier: Carrier::I32,
        };
        assert_eq!(load.to_string(), "load<i32>(this + 12 + i0 * 8)");

        let call = Expr::CallNative {
            entry_point: "fill".to_string(),
            signature: NativeSignature::new(vec![Carrier::Address], Carrier::Void),
            args: vec![Expr::param("buf")],
            critical: true,
        };
        assert_eq!(call.to_string(), "critical [fill(ptr) -> void](buf)");
    }
}

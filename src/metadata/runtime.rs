//! Built-in runtime reference assemblies.

use crate::core::{domain::Reference, errors::CompileError};
use crate::metadata::{Assembly, MemberDef, TypeDef, TypeKind};

pub const CORE_LIBRARY: &str = "System.Private.CoreLib";
pub const IMAGE_EXTENSION: &str = "dll";

const OBJECT: &str = "System.Object";
const STRING: &str = "System.String";
const INT32: &str = "System.Int32";
const BOOLEAN: &str = "System.Boolean";

pub fn core_library() -> Assembly {
    let object = TypeDef::class("System", "Object")
        .with_member(MemberDef::constructor())
        .with_member(MemberDef::method("ToString", Some(STRING)))
        .with_member(MemberDef::method("Equals", Some(BOOLEAN)).with_parameters(&[OBJECT]))
        .with_member(MemberDef::method("GetHashCode", Some(INT32)))
        .with_member(MemberDef::method("GetType", Some("System.Type")));

    let primitives = [
        "Boolean", "Byte", "SByte", "Char", "Int16", "UInt16", "Int32", "UInt32", "Int64",
        "UInt64", "Single", "Double", "Decimal", "IntPtr", "UIntPtr", "Void", "DateTime",
        "TimeSpan", "Guid",
    ];

    let mut assembly = Assembly::new(CORE_LIBRARY)
        .with_type(object)
        .with_type(TypeDef::class("System", "ValueType").with_base(OBJECT))
        .with_type(TypeDef::class("System", "Enum").with_base("System.ValueType"))
        .with_type(TypeDef::class("System", "Type").with_base(OBJECT)
            .with_member(MemberDef::property("Name", STRING))
            .with_member(MemberDef::property("FullName", STRING)))
        .with_type(TypeDef::class("System", "Attribute").with_base(OBJECT))
        .with_type(TypeDef::class("System", "Delegate").with_base(OBJECT))
        .with_type(TypeDef::class("System", "EventHandler").with_base("System.Delegate"))
        .with_type(TypeDef::class("System", "Array").with_base(OBJECT)
            .with_member(MemberDef::property("Length", INT32)))
        .with_type(
            TypeDef::class("System", "String")
                .with_base(OBJECT)
                .with_member(MemberDef::property("Length", INT32))
                .with_member(MemberDef::static_field("Empty", STRING))
                .with_member(MemberDef::static_method("IsNullOrEmpty", Some(BOOLEAN)).with_parameters(&[STRING]))
                .with_member(MemberDef::static_method("Concat", Some(STRING)).with_parameters(&[STRING, STRING]))
                .with_member(MemberDef::static_method("Format", Some(STRING)).with_parameters(&[STRING, OBJECT]))
                .with_member(MemberDef::method("Trim", Some(STRING)))
                .with_member(MemberDef::method("ToUpperInvariant", Some(STRING)))
                .with_member(MemberDef::method("Contains", Some(BOOLEAN)).with_parameters(&[STRING])),
        )
        .with_type(
            TypeDef::class("System", "Exception")
                .with_base(OBJECT)
                .with_member(MemberDef::constructor().with_parameters(&[STRING]))
                .with_member(MemberDef::property("Message", STRING)),
        )
        .with_type(TypeDef::class("System", "InvalidOperationException").with_base("System.Exception"))
        .with_type(TypeDef::class("System", "ArgumentException").with_base("System.Exception"))
        .with_type(TypeDef::class("System", "ArgumentNullException").with_base("System.ArgumentException"))
        .with_type(TypeDef::class("System", "NotSupportedException").with_base("System.Exception"))
        .with_type(TypeDef::new("System", "IDisposable", TypeKind::Interface)
            .with_member(MemberDef::method("Dispose", None)))
        .with_type(
            TypeDef::class("System", "Math")
                .make_static()
                .with_base(OBJECT)
                .with_member(MemberDef::static_method("Abs", Some(INT32)).with_parameters(&[INT32]))
                .with_member(MemberDef::static_method("Max", Some(INT32)).with_parameters(&[INT32, INT32]))
                .with_member(MemberDef::static_method("Min", Some(INT32)).with_parameters(&[INT32, INT32]))
                .with_member(MemberDef::static_field("PI", "System.Double")),
        )
        .with_type(
            TypeDef::class("System", "Environment")
                .make_static()
                .with_base(OBJECT)
                .with_member(MemberDef::static_method("Exit", None).with_parameters(&[INT32]))
                .with_member(MemberDef::static_property("NewLine", STRING))
                .with_member(MemberDef::static_method("GetEnvironmentVariable", Some(STRING)).with_parameters(&[STRING])),
        )
        .with_type(
            TypeDef::class("System.IO", "File")
                .make_static()
                .with_base(OBJECT)
                .with_member(MemberDef::static_method("ReadAllText", Some(STRING)).with_parameters(&[STRING]))
                .with_member(MemberDef::static_method("WriteAllText", None).with_parameters(&[STRING, STRING]))
                .with_member(MemberDef::static_method("Delete", None).with_parameters(&[STRING])),
        )
        .with_type(
            TypeDef::class("System.Threading", "Thread")
                .with_base(OBJECT)
                .with_member(MemberDef::static_method("Sleep", None).with_parameters(&[INT32])),
        );

    for name in primitives {
        let base = if name == "Void" { OBJECT } else { "System.ValueType" };
        assembly = assembly.with_type(TypeDef::structure("System", name).with_base(base));
    }

    assembly
}

pub fn console() -> Assembly {
    let mut assembly = Assembly::new("System.Console").with_type(
        TypeDef::class("System", "Console")
            .make_static()
            .with_base(OBJECT)
            .with_member(MemberDef::static_method("WriteLine", None))
            .with_member(MemberDef::static_method("WriteLine", None).with_parameters(&[STRING]))
            .with_member(MemberDef::static_method("WriteLine", None).with_parameters(&[OBJECT]))
            .with_member(MemberDef::static_method("Write", None).with_parameters(&[STRING]))
            .with_member(MemberDef::static_method("ReadLine", Some(STRING))),
    );
    assembly.references.push(CORE_LIBRARY.to_string());
    assembly
}

pub fn component_model() -> Assembly {
    let mut assembly = Assembly::new("System.ComponentModel.Primitives").with_type(
        TypeDef::class("System.ComponentModel", "Component")
            .with_base(OBJECT)
            .with_base("System.IDisposable")
            .with_member(MemberDef::method("Dispose", None)),
    );
    assembly.references.push(CORE_LIBRARY.to_string());
    assembly
}

pub fn diagnostics_process() -> Assembly {
    const PROCESS: &str = "System.Diagnostics.Process";

    let mut assembly = Assembly::new("System.Diagnostics.Process").with_type(
        TypeDef::class("System.Diagnostics", "Process")
            .with_base("System.ComponentModel.Component")
            .with_member(MemberDef::constructor())
            .with_member(MemberDef::static_method("GetCurrentProcess", Some(PROCESS)))
            .with_member(MemberDef::static_method("Start", Some(PROCESS)).with_parameters(&[STRING]))
            .with_member(MemberDef::method("Kill", None))
            .with_member(MemberDef::method("WaitForExit", None))
            .with_member(MemberDef::property("Id", INT32))
            .with_member(MemberDef::property("ProcessName", STRING))
            .with_member(MemberDef::event("Exited", "System.EventHandler")),
    );
    assembly.references.push(CORE_LIBRARY.to_string());
    assembly
        .references
        .push("System.ComponentModel.Primitives".to_string());
    assembly
}

pub fn collections() -> Assembly {
    let mut assembly = Assembly::new("System.Collections")
        .with_type(
            TypeDef::class("System.Collections.Generic", "List`1")
                .with_base(OBJECT)
                .with_member(MemberDef::constructor())
                .with_member(MemberDef::method("Add", None).with_parameters(&["T"]))
                .with_member(MemberDef::method("Clear", None))
                .with_member(MemberDef::property("Count", INT32)),
        )
        .with_type(
            TypeDef::class("System.Collections.Generic", "Dictionary`2")
                .with_base(OBJECT)
                .with_member(MemberDef::constructor())
                .with_member(MemberDef::method("Add", None).with_parameters(&["TKey", "TValue"]))
                .with_member(MemberDef::method("ContainsKey", Some(BOOLEAN)).with_parameters(&["TKey"]))
                .with_member(MemberDef::property("Count", INT32)),
        );
    assembly.references.push(CORE_LIBRARY.to_string());
    assembly
}

/// Every built-in runtime assembly, core library first.
pub fn runtime_assemblies() -> Vec<Assembly> {
    vec![
        core_library(),
        console(),
        component_model(),
        diagnostics_process(),
        collections(),
    ]
}

/// File name a runtime assembly is written under, e.g. `System.Console.dll`.
pub fn image_file_name(assembly: &Assembly) -> String {
    format!("{}.{}", assembly.name, IMAGE_EXTENSION)
}

pub fn to_reference(assembly: &Assembly) -> Result<Reference, CompileError> {
    let body = assembly
        .to_bytes()
        .map_err(|e| CompileError::Internal { msg: e.to_string() })?;
    Ok(Reference::new(assembly.name.clone(), body))
}

pub fn runtime_references() -> Result<Vec<Reference>, CompileError> {
    runtime_assemblies().iter().map(to_reference).collect()
}

/// Writes every runtime assembly into `dir`, returning the written paths.
#[tracing::instrument]
pub async fn write_runtime(dir: &std::path::Path) -> Result<Vec<std::path::PathBuf>, CompileError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CompileError::io(dir, &e))?;

    let mut written = Vec::new();
    for assembly in runtime_assemblies() {
        let path = dir.join(image_file_name(&assembly));
        let reference = to_reference(&assembly)?;
        tokio::fs::write(&path, &reference.body)
            .await
            .map_err(|e| CompileError::io(&path, &e))?;
        tracing::debug!("Wrote runtime assembly {}", path.display());
        written.push(path);
    }
    Ok(written)
}

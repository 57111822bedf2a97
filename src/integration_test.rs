use std::sync::Arc;

use uuid::Uuid;

use crate::analyzers::to_banned_symbols_analyzer;
use crate::config::CompilerConfig;
use crate::core::{
    cancellation::CancellationToken,
    domain::{Language, Location, Reference},
    errors::CompileError,
    extensions::{to_extension, to_valid_ref_images, try_to_language, CompilationResultExt},
    provider::CompilerProvider,
    references::{AssemblyReference, CodeReference, ImageReference},
    traits::Compiler,
};
use crate::csharp::CSharpCompiler;
use crate::metadata::{runtime, Assembly};

const PROCESS_SOURCE: &str = "using System.Diagnostics;\n\nclass Class1\n{\n\tpublic void Method()\n\t{\n\t\tProcess.GetCurrentProcess().Kill();\n\t}\n}";

fn provider() -> CompilerProvider {
    CompilerProvider::with_defaults(&CompilerConfig::default()).expect("default compilers register")
}

fn csharp(provider: &CompilerProvider) -> Arc<dyn Compiler> {
    provider
        .get_compiler(Language::CSharp)
        .expect("C# compiler is registered")
}

fn references(assemblies: &[Assembly]) -> Vec<Reference> {
    assemblies
        .iter()
        .map(|a| runtime::to_reference(a).unwrap())
        .collect()
}

#[tokio::test]
async fn test_compile_and_load_image() {
    let provider = provider();
    let result = csharp(&provider)
        .compile(
            "test",
            &["using System;\nnamespace App { public class Program { public static void Main() { Console.WriteLine(\"hi\"); } } }".to_string()],
            &references(&[runtime::core_library(), runtime::console()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!result.has_errors(), "{}", result.summary());
    let assembly = Assembly::load(result.assembly().unwrap()).unwrap();
    let program = assembly.find_type("App.Program").unwrap();
    assert!(program.members_named("Main").next().is_some_and(|m| m.is_static));
}

#[tokio::test]
async fn test_unmatched_brace_has_no_image() {
    let provider = provider();
    let result = csharp(&provider)
        .compile(
            "test",
            &["class Class1 {".to_string()],
            &references(&[runtime::core_library()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.has_errors());
    assert!(result.assembly().is_none());
    assert_eq!(result.errors_only()[0].id, "CS1513");

    let thrown = result.throw_if_errors();
    assert!(matches!(
        thrown,
        Err(CompileError::Failed { ref msg }) if msg.starts_with("Compilation error: test.cs(1,15): error CS1513")
    ));
}

#[tokio::test]
async fn test_pre_cancelled_compile() {
    let provider = provider();
    for language in provider.languages() {
        let result = provider
            .get_compiler(language)
            .unwrap()
            .compile(
                "test",
                &["class Class1 {}".to_string()],
                &[],
                &CancellationToken::cancelled_token(),
            )
            .await;
        assert_eq!(result, Err(CompileError::Cancelled), "{}", language);
    }
}

#[tokio::test]
async fn test_banned_process() {
    let provider = provider();
    let (analyzer, settings) =
        to_banned_symbols_analyzer("T:System.Diagnostics.Process;Don't use Process");

    let diagnostics = csharp(&provider)
        .analyse(
            analyzer,
            &[settings],
            "test",
            &[PROCESS_SOURCE.to_string()],
            &references(&[
                runtime::core_library(),
                runtime::component_model(),
                runtime::diagnostics_process(),
            ]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
    assert_eq!(
        diagnostics[0].message,
        "The symbol 'Process' is banned in this project: Don't use Process"
    );
    assert_eq!(diagnostics[0].location, Some(Location::new("test.cs", 7, 3)));
}

#[tokio::test]
async fn test_banned_method_and_namespace() {
    let provider = provider();
    let refs = references(&[
        runtime::core_library(),
        runtime::component_model(),
        runtime::diagnostics_process(),
    ]);

    let (analyzer, settings) = to_banned_symbols_analyzer("M:System.Diagnostics.Process.Kill;no killing");
    let diagnostics = csharp(&provider)
        .analyse(
            analyzer,
            &[settings],
            "test",
            &[PROCESS_SOURCE.to_string()],
            &refs,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
    assert_eq!(
        diagnostics[0].message,
        "The symbol 'Process.Kill' is banned in this project: no killing"
    );

    let (analyzer, settings) = to_banned_symbols_analyzer("N:System.Diagnostics");
    let diagnostics = csharp(&provider)
        .analyse(
            analyzer,
            &[settings],
            "test",
            &[PROCESS_SOURCE.to_string()],
            &refs,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
    assert_eq!(
        diagnostics[0].message,
        "The symbol 'Process' is banned in this project"
    );
}

#[tokio::test]
async fn test_banned_method_through_variables() {
    let provider = provider();
    let refs = references(&[
        runtime::core_library(),
        runtime::component_model(),
        runtime::diagnostics_process(),
    ]);
    let cases = [
        "using System.Diagnostics;\nclass A { void M(Process p) { p.Kill(); } }",
        "using System.Diagnostics;\nclass A { void M() { var p = Process.GetCurrentProcess(); p.Kill(); } }",
        "using System.Diagnostics;\nclass A { void M(object o) { if (o is Process p) { p.Kill(); } } }",
    ];

    for source in cases {
        let (analyzer, settings) = to_banned_symbols_analyzer("M:System.Diagnostics.Process.Kill;x");
        let diagnostics = csharp(&provider)
            .analyse(
                analyzer,
                &[settings],
                "test",
                &[source.to_string()],
                &refs,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1, "{}: {:?}", source, diagnostics);
        assert_eq!(diagnostics[0].location.as_ref().map(|l| l.line), Some(2));
    }
}

#[tokio::test]
async fn test_concurrent_compiles_do_not_cross_talk() {
    let compiler = csharp(&provider());
    let refs = Arc::new(references(&[runtime::core_library()]));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let compiler = compiler.clone();
            let refs = refs.clone();
            tokio::spawn(async move {
                let source = if i % 2 == 0 {
                    format!("class Type{} {{ int field{}; }}", i, i)
                } else {
                    format!("class Type{} {{", i)
                };
                let name = format!("unit{}", i);
                let result = compiler
                    .compile(&name, &[source], &refs, &CancellationToken::new())
                    .await
                    .unwrap();
                (i, result)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        if i % 2 == 0 {
            assert!(!result.has_errors(), "{}", result.summary());
            let assembly = Assembly::load(result.assembly().unwrap()).unwrap();
            assert_eq!(assembly.name, format!("unit{}", i));
            assert_eq!(assembly.types.len(), 1);
            assert_eq!(assembly.types[0].name, format!("Type{}", i));
        } else {
            assert!(result.image.is_none());
            assert!(result.has_errors());
            for error in &result.errors {
                let file = &error.location.as_ref().unwrap().file;
                assert_eq!(file, &format!("unit{}.cs", i));
            }
        }
    }
}

#[tokio::test]
async fn test_compiled_image_as_reference() {
    let compiler = CSharpCompiler::new();
    let corlib = references(&[runtime::core_library()]);

    let library = compiler
        .compile(
            "Lib",
            &["namespace Lib { public class Greeter { public static string Hello() { return \"hi\"; } } }".to_string()],
            &corlib,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .throw_if_errors()
        .unwrap();

    let lib_ref = ImageReference::new("Lib", library.image.clone().unwrap());
    let mut refs = corlib.clone();
    refs.extend(lib_ref.images(&CancellationToken::new()).await.unwrap());

    let app = compiler
        .compile(
            "App",
            &["using Lib;\nclass App { string Run() { return Greeter.Hello(); } }".to_string()],
            &refs,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!app.has_errors(), "{}", app.summary());
    let assembly = Assembly::load(app.assembly().unwrap()).unwrap();
    assert!(assembly.references.contains(&"Lib".to_string()));

    let missing = compiler
        .compile(
            "App",
            &["using Lib;\nclass App { void Run() { Greeter.Bye(); } }".to_string()],
            &refs,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(missing.errors_only().len(), 1);
    assert_eq!(missing.errors_only()[0].id, "CS0117");
}

#[tokio::test]
async fn test_runtime_directory_references() {
    let dir = std::env::temp_dir().join(format!("dyncompile_it_{}", Uuid::new_v4()));
    runtime::write_runtime(&dir).await.unwrap();

    let mut code_refs: Vec<Arc<dyn CodeReference>> = runtime::runtime_assemblies()
        .iter()
        .map(|a| Arc::new(AssemblyReference::new(dir.join(runtime::image_file_name(a)))) as Arc<dyn CodeReference>)
        .collect();
    code_refs.push(Arc::new(AssemblyReference::new(dir.join("Missing.dll"))));

    let refs = to_valid_ref_images(&code_refs, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(refs.len(), runtime::runtime_assemblies().len());
    assert_eq!(refs[0].name, runtime::CORE_LIBRARY);

    let result = CSharpCompiler::new()
        .compile("test", &[PROCESS_SOURCE.to_string()], &refs, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!result.has_errors(), "{}", result.summary());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[test]
fn test_extension_round_trip() {
    for language in [Language::CSharp, Language::VisualBasic, Language::FSharp, Language::Python] {
        let ext = to_extension(language);
        assert_eq!(try_to_language(ext), Some(language));
        assert_eq!(to_extension(try_to_language(&ext.to_uppercase()).unwrap()), ext);
    }
}

#[test]
fn test_registry_idempotence() {
    let provider = provider();
    let removed = provider.unregister_compiler(Language::CSharp).unwrap();
    assert!(provider.try_get_compiler(Language::CSharp).is_none());

    provider
        .register_compiler(Language::CSharp, removed.clone())
        .unwrap();
    assert!(Arc::ptr_eq(
        &provider.get_compiler(Language::CSharp).unwrap(),
        &removed
    ));
}

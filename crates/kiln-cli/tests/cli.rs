use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use kiln_classfile::access::{ACC_ABSTRACT, ACC_INTERFACE, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use kiln_classfile::{Annotation, Attribute, ClassFile, ClassMember};
use predicates::prelude::*;

const ENTITY_BASE: &str = "io/quarkus/hibernate/orm/panache/PanacheEntityBase";
const CONTRACT: &str = "io/quarkus/hibernate/orm/panache/PanacheRepositoryBase";

fn kiln() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("kiln"))
}

fn write_class(dir: &TempDir, class: ClassFile) {
    let path = format!("{}.class", class.this_class);
    dir.child(path).write_binary(&class.to_bytes().unwrap()).unwrap();
}

fn with_signature(mut class: ClassFile, signature: &str) -> ClassFile {
    let attr = Attribute::signature(&mut class.constant_pool, signature).unwrap();
    class.set_attribute(attr);
    class
}

/// Entity base, one entity with a `@Find` native finder, the repository
/// contract and a repository binding it with `repository_signature`.
fn project(repository_signature: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    write_class(&dir, ClassFile::new(ACC_PUBLIC | ACC_SUPER, ENTITY_BASE, Some("java/lang/Object")));

    let mut book = ClassFile::new(ACC_PUBLIC | ACC_SUPER, "app/Book", Some(ENTITY_BASE));
    let mut finder = ClassMember::new(
        ACC_PUBLIC | ACC_STATIC | ACC_NATIVE,
        "findByTitle",
        "(Ljava/lang/String;)Lapp/Book;",
    );
    let names = Attribute::method_parameters(&mut book.constant_pool, &["title".to_string()]).unwrap();
    finder.set_attribute(names);
    let find = Attribute::annotations(
        &mut book.constant_pool,
        false,
        &[Annotation::marker("org/hibernate/annotations/processing/Find")],
    )
    .unwrap();
    finder.set_attribute(find);
    book.methods.push(finder);
    write_class(&dir, book);

    let mut contract = ClassFile::new(
        ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
        CONTRACT,
        Some("java/lang/Object"),
    );
    let mut find_by_id = ClassMember::new(
        ACC_PUBLIC | ACC_ABSTRACT,
        "findById",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
    );
    let signature = Attribute::signature(&mut contract.constant_pool, "(TId;)TEntity;").unwrap();
    find_by_id.set_attribute(signature);
    let bridge = Attribute::annotations(
        &mut contract.constant_pool,
        false,
        &[Annotation::marker("io/quarkus/panache/common/impl/GenerateBridge")],
    )
    .unwrap();
    find_by_id.set_attribute(bridge);
    contract.methods.push(find_by_id);
    write_class(
        &dir,
        with_signature(
            contract,
            "<Entity:Ljava/lang/Object;Id:Ljava/lang/Object;>Ljava/lang/Object;",
        ),
    );

    let mut repository = ClassFile::new(ACC_PUBLIC | ACC_SUPER, "app/BookRepository", Some("java/lang/Object"));
    repository.interfaces.push(CONTRACT.to_string());
    write_class(&dir, with_signature(repository, repository_signature));
    dir
}

const BOOK_REPOSITORY: &str =
    "Ljava/lang/Object;Lio/quarkus/hibernate/orm/panache/PanacheRepositoryBase<Lapp/Book;Ljava/lang/Long;>;";

#[test]
fn help_mentions_core_commands() {
    kiln().arg("--help").assert().success().stdout(
        predicate::str::contains("index")
            .and(predicate::str::contains("resolve"))
            .and(predicate::str::contains("enhance")),
    );
}

#[test]
fn index_json_reports_the_plan() {
    let input = project(BOOK_REPOSITORY);
    let output = kiln().arg("index").arg(input.path()).arg("--json").output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["classes"].as_u64().unwrap(), 4);
    let plan = v["plan"].as_array().unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0]["class"], "app.Book");
    assert_eq!(plan[0]["enhancers"][0], "panache-entity");
    assert_eq!(plan[1]["class"], "app.BookRepository");
    assert_eq!(plan[1]["enhancers"][0], "panache-repository");
    assert!(v["storage"].as_array().unwrap().is_empty());
}

#[test]
fn resolve_prints_bound_arguments() {
    let input = project(BOOK_REPOSITORY);
    kiln()
        .arg("resolve")
        .arg(input.path())
        .arg("app/BookRepository")
        .arg(CONTRACT)
        .assert()
        .success()
        .stdout("app.Book, java.lang.Long\n");

    kiln()
        .arg("resolve")
        .arg(input.path())
        .arg("app.Book")
        .arg(CONTRACT)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("is not a supertype of app.Book"));
}

#[test]
fn enhance_writes_rewritten_classes() {
    let input = project(BOOK_REPOSITORY);
    let out = TempDir::new().unwrap();
    let output = kiln()
        .arg("enhance")
        .arg(input.path())
        .arg(out.path())
        .arg("--json")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["classes_read"].as_u64().unwrap(), 4);
    assert_eq!(v["enhanced"].as_u64().unwrap(), 2);
    assert_eq!(v["generated"].as_u64().unwrap(), 0);

    let bytes = std::fs::read(out.path().join("app/Book.class")).unwrap();
    let book = ClassFile::parse(&bytes).unwrap();
    let finder = book.method("findByTitle", "(Ljava/lang/String;)Lapp/Book;").unwrap();
    assert!(!finder.has_flags(ACC_NATIVE));
    assert!(finder.attribute("Code").is_some());
    let bytes = std::fs::read(out.path().join("app/BookRepository.class")).unwrap();
    let repository = ClassFile::parse(&bytes).unwrap();
    assert!(repository.method("findById", "(Ljava/lang/Long;)Lapp/Book;").is_some());
    out.child("io").assert(predicate::path::missing());
}

#[test]
fn failed_build_writes_nothing() {
    let input = project(
        "<E:Ljava/lang/Object;>Ljava/lang/Object;Lio/quarkus/hibernate/orm/panache/PanacheRepositoryBase<TE;Ljava/lang/Long;>;",
    );
    let out = TempDir::new().unwrap();
    kiln()
        .arg("enhance")
        .arg(input.path())
        .arg(out.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("app.BookRepository"));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn invalid_config_is_reported() {
    let input = project(BOOK_REPOSITORY);
    let config = TempDir::new().unwrap();
    config
        .child("kiln.toml")
        .write_str("[panache]\nflavour = \"orm\"\n")
        .unwrap();
    kiln()
        .arg("--config")
        .arg(config.child("kiln.toml").path())
        .arg("index")
        .arg(input.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to load config"));
}

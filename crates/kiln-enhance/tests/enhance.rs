use kiln_classfile::access::{
    ACC_ABSTRACT, ACC_BRIDGE, ACC_FINAL, ACC_INTERFACE, ACC_NATIVE, ACC_PRIVATE, ACC_PUBLIC,
    ACC_STATIC, ACC_SUPER, ACC_SYNTHETIC,
};
use kiln_classfile::opcodes::{ALOAD, INVOKESPECIAL, PUTFIELD, RETURN};
use kiln_classfile::{Annotation, Attribute, ClassFile, ClassMember, CodeBuilder, RecordComponent};
use kiln_config::KilnConfig;
use kiln_enhance::{Build, MemoryOutput};
use kiln_index::{Index, Indexer};
use pretty_assertions::assert_eq;

const ENTITY_BASE: &str = "io/quarkus/hibernate/orm/panache/PanacheEntityBase";
const CONTRACT: &str = "io/quarkus/hibernate/orm/panache/PanacheRepositoryBase";
const GENERATE_BRIDGE: &str = "io/quarkus/panache/common/impl/GenerateBridge";
const FIND: &str = "org/hibernate/annotations/processing/Find";
const HQL: &str = "org/hibernate/annotations/processing/HQL";
const CHECKED: &str = "io/quarkus/qute/CheckedTemplate";
const INSTANCE: &str = "io/quarkus/qute/TemplateInstance";
const DECLARATION: &str = "io/smallrye/context/storage/spi/StorageDeclaration";

struct Fixture {
    class: ClassFile,
}

impl Fixture {
    fn class(name: &str, super_class: &str) -> Self {
        Self {
            class: ClassFile::new(ACC_PUBLIC | ACC_SUPER, name, Some(super_class)),
        }
    }

    fn interface(name: &str) -> Self {
        Self {
            class: ClassFile::new(
                ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
                name,
                Some("java/lang/Object"),
            ),
        }
    }

    fn implements(mut self, interface: &str) -> Self {
        self.class.interfaces.push(interface.to_string());
        self
    }

    fn signature(mut self, signature: &str) -> Self {
        let attr = Attribute::signature(&mut self.class.constant_pool, signature).unwrap();
        self.class.set_attribute(attr);
        self
    }

    fn annotated(mut self, annotation: &str) -> Self {
        let attr = Attribute::annotations(
            &mut self.class.constant_pool,
            true,
            &[Annotation::marker(annotation)],
        )
        .unwrap();
        self.class.set_attribute(attr);
        self
    }

    fn method(
        mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        names: &[&str],
        annotation: Option<&str>,
    ) -> Self {
        let cp = &mut self.class.constant_pool;
        let mut member = ClassMember::new(flags, name, descriptor);
        if !names.is_empty() {
            let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
            member.set_attribute(Attribute::method_parameters(cp, &names).unwrap());
        }
        if let Some(annotation) = annotation {
            member.set_attribute(
                Attribute::annotations(cp, false, &[Annotation::marker(annotation)]).unwrap(),
            );
        }
        self.class.methods.push(member);
        self
    }

    fn with_signature(mut self, method: &str, signature: &str) -> Self {
        let attr = Attribute::signature(&mut self.class.constant_pool, signature).unwrap();
        let member = self
            .class
            .methods
            .iter_mut()
            .find(|m| m.name == method)
            .unwrap();
        member.set_attribute(attr);
        self
    }

    fn bytes(self) -> Vec<u8> {
        self.class.to_bytes().unwrap()
    }
}

/// `record hello(String name) implements TemplateInstance`.
fn record_template() -> Vec<u8> {
    let name = "app/Pages$hello";
    let mut class = ClassFile::new(ACC_PUBLIC | ACC_FINAL | ACC_SUPER, name, Some("java/lang/Record"));
    class.interfaces.push(INSTANCE.to_string());
    class
        .fields
        .push(ClassMember::new(ACC_PRIVATE | ACC_FINAL, "name", "Ljava/lang/String;"));
    let record = Attribute::record(
        &mut class.constant_pool,
        &[RecordComponent {
            name: "name".into(),
            descriptor: "Ljava/lang/String;".into(),
            signature: None,
        }],
    )
    .unwrap();
    class.set_attribute(record);

    let mut code = CodeBuilder::new(&mut class.constant_pool, 2);
    code.var_insn(ALOAD, 0).unwrap();
    code.invoke(INVOKESPECIAL, "java/lang/Record", "<init>", "()V", false)
        .unwrap();
    code.var_insn(ALOAD, 0).unwrap();
    code.var_insn(ALOAD, 1).unwrap();
    code.field_insn(PUTFIELD, name, "name", "Ljava/lang/String;")
        .unwrap();
    code.insn(RETURN).unwrap();
    let code = code.finish().unwrap();
    let mut ctor = ClassMember::new(ACC_PUBLIC, "<init>", "(Ljava/lang/String;)V");
    ctor.set_code(&mut class.constant_pool, &code).unwrap();
    let names = Attribute::method_parameters(&mut class.constant_pool, &["name".to_string()]).unwrap();
    ctor.set_attribute(names);
    class.methods.push(ctor);
    class.to_bytes().unwrap()
}

fn application(repository_signature: &str) -> Vec<Vec<u8>> {
    vec![
        Fixture::class(ENTITY_BASE, "java/lang/Object").bytes(),
        Fixture::class("app/Book", ENTITY_BASE)
            .method(
                ACC_PUBLIC | ACC_STATIC | ACC_NATIVE,
                "findByTitle",
                "(Ljava/lang/String;)Lapp/Book;",
                &["title"],
                Some(FIND),
            )
            .method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "countAll", "()J", &[], None)
            .bytes(),
        Fixture::interface(CONTRACT)
            .signature("<Entity:Ljava/lang/Object;Id:Ljava/lang/Object;>Ljava/lang/Object;")
            .method(
                ACC_PUBLIC | ACC_ABSTRACT,
                "findById",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
                &["id"],
                Some(GENERATE_BRIDGE),
            )
            .with_signature("findById", "(TId;)TEntity;")
            .bytes(),
        Fixture::class("app/BookRepository", "java/lang/Object")
            .implements(CONTRACT)
            .signature(repository_signature)
            .method(
                ACC_PUBLIC | ACC_NATIVE,
                "deleteByTitle",
                "(Ljava/lang/String;)I",
                &["title"],
                Some(HQL),
            )
            .bytes(),
        Fixture::interface(INSTANCE).bytes(),
        Fixture::class("app/Templates", "java/lang/Object")
            .annotated(CHECKED)
            .method(
                ACC_PUBLIC | ACC_STATIC | ACC_NATIVE,
                "greet",
                "(Ljava/lang/String;I)Lio/quarkus/qute/TemplateInstance;",
                &["name", "times"],
                None,
            )
            .bytes(),
        record_template(),
        Fixture::interface(DECLARATION)
            .signature("<T:Ljava/lang/Object;>Ljava/lang/Object;")
            .bytes(),
        Fixture::class("app/RequestStorage", "java/lang/Object")
            .implements(DECLARATION)
            .signature(
                "Ljava/lang/Object;Lio/smallrye/context/storage/spi/StorageDeclaration<Ljava/util/Map<Ljava/lang/String;Ljava/lang/Object;>;>;",
            )
            .bytes(),
    ]
}

fn index_of(classes: &[Vec<u8>]) -> Index {
    let mut indexer = Indexer::new();
    for bytes in classes {
        indexer.index_class(bytes).unwrap();
    }
    indexer.complete()
}

fn disassemble(class: &ClassFile, name: &str, descriptor: &str) -> Vec<String> {
    let cp = &class.constant_pool;
    class
        .method(name, descriptor)
        .unwrap_or_else(|| panic!("missing {name}{descriptor}"))
        .code(cp)
        .unwrap()
        .unwrap()
        .disassemble(cp)
        .unwrap()
}

const BOOK_REPOSITORY: &str =
    "Ljava/lang/Object;Lio/quarkus/hibernate/orm/panache/PanacheRepositoryBase<Lapp/Book;Ljava/lang/Long;>;";

#[test]
fn whole_application_is_enhanced() {
    let classes = application(BOOK_REPOSITORY);
    let index = index_of(&classes);
    let config = KilnConfig::default();
    let build = Build::new(&index, &config).unwrap();

    let output = MemoryOutput::new();
    let summary = build.run(&classes, &output).unwrap();
    assert_eq!(summary.enhanced, 5);
    assert_eq!(summary.generated, 1);

    let names: Vec<String> = output.names().iter().map(ToString::to_string).collect();
    assert_eq!(
        names,
        vec![
            "app.Book",
            "app.BookRepository",
            "app.Pages$hello",
            "app.Templates",
            "io.quarkus.deployment.storage.QuarkusStorageImpl__0",
        ]
    );

    let parse = |name: &str| ClassFile::parse(&output.get(name).unwrap()).unwrap();

    let book = parse("app.Book");
    assert_eq!(
        disassemble(&book, "findByTitle", "(Ljava/lang/String;)Lapp/Book;"),
        vec![
            "invokestatic app/Book.getEntityManager()Ljakarta/persistence/EntityManager;",
            "aload_0",
            "invokestatic app/Book_.findByTitle(Ljakarta/persistence/EntityManager;Ljava/lang/String;)Lapp/Book;",
            "areturn",
        ]
    );
    let find = book.method("findByTitle", "(Ljava/lang/String;)Lapp/Book;").unwrap();
    assert!(!find.has_flags(ACC_NATIVE));
    assert_eq!(
        find.parameter_names(&book.constant_pool).unwrap(),
        Some(vec!["title".to_string()])
    );
    assert!(book.method("countAll", "()J").unwrap().has_flags(ACC_NATIVE));

    let repository = parse("app.BookRepository");
    assert_eq!(
        disassemble(&repository, "deleteByTitle", "(Ljava/lang/String;)I"),
        vec![
            "aload_0",
            "invokevirtual app/BookRepository.getEntityManager()Ljakarta/persistence/EntityManager;",
            "aload_1",
            "invokestatic app/BookRepository_.deleteByTitle(Ljakarta/persistence/EntityManager;Ljava/lang/String;)I",
            "ireturn",
        ]
    );
    assert_eq!(
        disassemble(&repository, "findById", "(Ljava/lang/Long;)Lapp/Book;"),
        vec![
            "ldc class app/Book",
            "aload_1",
            "invokestatic io/quarkus/hibernate/orm/panache/runtime/JpaOperations.findById(Ljava/lang/Class;Ljava/lang/Object;)Ljava/lang/Object;",
            "checkcast app/Book",
            "areturn",
        ]
    );
    let erased = repository
        .method("findById", "(Ljava/lang/Object;)Ljava/lang/Object;")
        .unwrap();
    assert!(erased.has_flags(ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC));

    let templates = parse("app.Templates");
    let greet = disassemble(
        &templates,
        "greet",
        "(Ljava/lang/String;I)Lio/quarkus/qute/TemplateInstance;",
    );
    assert_eq!(
        greet[7..].to_vec(),
        vec![
            "ldc \"greet\"",
            "invokevirtual io/quarkus/qute/runtime/TemplateProducer.getInjectableTemplate(Ljava/lang/String;)Lio/quarkus/qute/Template;",
            "invokeinterface io/quarkus/qute/Template.instance()Lio/quarkus/qute/TemplateInstance;",
            "ldc \"name\"",
            "aload_0",
            "invokeinterface io/quarkus/qute/TemplateInstance.data(Ljava/lang/String;Ljava/lang/Object;)Lio/quarkus/qute/TemplateInstance;",
            "ldc \"times\"",
            "iload_1",
            "invokestatic java/lang/Integer.valueOf(I)Ljava/lang/Integer;",
            "invokeinterface io/quarkus/qute/TemplateInstance.data(Ljava/lang/String;Ljava/lang/Object;)Lio/quarkus/qute/TemplateInstance;",
            "areturn",
        ]
    );

    let record = parse("app.Pages$hello");
    let field = record.field("$wrapped").unwrap();
    assert_eq!(field.descriptor, "Lio/quarkus/qute/TemplateInstance;");
    assert!(field.has_flags(ACC_PRIVATE | ACC_FINAL));
    let ctor = disassemble(&record, "<init>", "(Ljava/lang/String;)V");
    assert_eq!(
        ctor[..5].to_vec(),
        vec![
            "aload_0",
            "invokespecial java/lang/Record.<init>()V",
            "aload_0",
            "aload_1",
            "putfield app/Pages$hello.name:Ljava/lang/String;",
        ]
    );
    assert!(ctor.contains(&"ldc \"Pages/hello\"".to_string()));
    assert_eq!(
        ctor[ctor.len() - 2..].to_vec(),
        vec![
            "putfield app/Pages$hello.$wrapped:Lio/quarkus/qute/TemplateInstance;",
            "return",
        ]
    );
    assert_eq!(
        disassemble(&record, "wrapped", "()Lio/quarkus/qute/TemplateInstance;"),
        vec![
            "aload_0",
            "getfield app/Pages$hello.$wrapped:Lio/quarkus/qute/TemplateInstance;",
            "areturn",
        ]
    );

    let shim = parse("io.quarkus.deployment.storage.QuarkusStorageImpl__0");
    assert_eq!(
        shim.signature().unwrap().as_deref(),
        Some("Ljava/lang/ThreadLocal<Ljava/util/Map<Ljava/lang/String;Ljava/lang/Object;>;>;")
    );
    assert!(shim.method("get", "()Ljava/util/Map;").is_some());
    assert_eq!(
        build.storage().mappings()[&kiln_types::ClassName::new("app.RequestStorage")].as_str(),
        "io.quarkus.deployment.storage.QuarkusStorageImpl__0"
    );
}

#[test]
fn failing_class_aborts_the_whole_build() {
    // A repository that leaves the entity type open cannot get bridges.
    let classes = application(
        "<E:Ljava/lang/Object;>Ljava/lang/Object;Lio/quarkus/hibernate/orm/panache/PanacheRepositoryBase<TE;Ljava/lang/Long;>;",
    );
    let index = index_of(&classes);
    let config = KilnConfig::default();
    let build = Build::new(&index, &config).unwrap();

    let output = MemoryOutput::new();
    let err = build.run(&classes, &output).unwrap_err();
    assert_eq!(err.class.as_str(), "app.BookRepository");
    assert_eq!(err.enhancer, "panache-repository");
    assert!(
        err.to_string()
            .contains("io.quarkus.hibernate.orm.panache.PanacheRepositoryBase"),
        "{err}"
    );
    assert!(output.is_empty());
}

#[test]
fn index_and_classes_must_agree() {
    let classes = application(BOOK_REPOSITORY);
    // Index an older Book without the native finder.
    let mut stale = classes.clone();
    stale[1] = Fixture::class("app/Book", ENTITY_BASE).bytes();
    let index = index_of(&stale);
    let config = KilnConfig::default();
    let build = Build::new(&index, &config).unwrap();

    let err = build.enhance_class(&classes[1]).unwrap_err();
    assert_eq!(
        err.source.to_string(),
        "Could not find indexed method: app.Book.findByTitle with descriptor (Ljava/lang/String;)Lapp/Book; and arg types [java.lang.String]"
    );
}

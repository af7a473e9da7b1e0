use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loomc::registry::{Body, Effect, EnumDef, Overload, Refinement, VariantDef};
use loomc::{verify, Instr, Literal, Registry, Slot, SlotType};

#[derive(Parser, Debug)]
#[command(name = "loom")]
#[command(about = "Verify and run the bundled Loom demo program")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the demo registry and report the resolution plans
    Check,
    /// Verify the demo registry, then execute an entry word
    Run {
        /// Entry word to execute
        #[arg(long, default_value = "main")]
        entry: String,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loomc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check => {
            let registry = demo_registry();
            match verify(&registry) {
                Ok(_) => println!("ok: all overloads verified"),
                Err(errors) => {
                    for error in &errors {
                        eprintln!("error: {}", error);
                    }
                    std::process::exit(1);
                }
            }
        }
        Command::Run { entry } => {
            let registry = demo_registry();
            let program = match verify(&registry) {
                Ok(p) => p,
                Err(errors) => {
                    for error in &errors {
                        eprintln!("error: {}", error);
                    }
                    std::process::exit(1);
                }
            };
            info!(entry = %entry, "verified, executing");
            match program.run(&entry) {
                Ok(stack) => println!("{}", stack),
                Err(error) => {
                    eprintln!("error: {}", error);
                    std::process::exit(1);
                }
            }
        }
        Command::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
        }
    }
}

/// The bundled demo: a word whose overloads are told apart by value
/// refinements, dispatched over a small enum, and an entry word driving it.
fn demo_registry() -> Registry {
    let mut registry = Registry::with_prelude();

    registry.define_enum(EnumDef {
        name: "Verdict".to_string(),
        variants: vec![
            VariantDef {
                name: "Exact".to_string(),
                payload: None,
            },
            VariantDef {
                name: "Close".to_string(),
                payload: None,
            },
        ],
    });

    // describe ( Verdict -- String ), one body per variant
    registry.define_word(
        "describe",
        Overload::new(
            Effect::new(
                vec![Slot::refined(
                    SlotType::Enum("Verdict".to_string()),
                    Refinement::Variant("Exact".to_string()),
                )],
                vec![Slot::typed(SlotType::String)],
            ),
            Body::Composed(vec![
                Instr::Call("drop".to_string()),
                Instr::Push(Literal::String("exactly right".to_string())),
            ]),
        ),
    );
    registry.define_word(
        "describe",
        Overload::new(
            Effect::new(
                vec![Slot::refined(
                    SlotType::Enum("Verdict".to_string()),
                    Refinement::Variant("Close".to_string()),
                )],
                vec![Slot::typed(SlotType::String)],
            ),
            Body::Composed(vec![
                Instr::Call("drop".to_string()),
                Instr::Push(Literal::String("close enough".to_string())),
            ]),
        ),
    );

    // grade sees a Verdict of unknown variant, so the call to describe is
    // planned as a by-variant dispatch over the whole set.
    registry.define_word(
        "grade",
        Overload::new(
            Effect::new(
                vec![Slot::typed(SlotType::Enum("Verdict".to_string()))],
                vec![Slot::typed(SlotType::String)],
            ),
            Body::Composed(vec![Instr::Call("describe".to_string())]),
        ),
    );

    // classify ( UnsignedInt -- String ), three refinement-separated bodies
    registry.define_word(
        "classify",
        Overload::new(
            Effect::new(
                vec![Slot::refined(
                    SlotType::UnsignedInt,
                    Refinement::Literal(Literal::UnsignedInt(42)),
                )],
                vec![Slot::typed(SlotType::String)],
            ),
            Body::Composed(vec![
                Instr::Call("drop".to_string()),
                Instr::Push(Literal::String("the answer".to_string())),
            ]),
        ),
    );
    registry.define_word(
        "classify",
        Overload::new(
            Effect::new(
                vec![Slot::refined(
                    SlotType::UnsignedInt,
                    Refinement::Predicate(std::rc::Rc::new(vec![
                        Instr::Push(Literal::UnsignedInt(9000)),
                        Instr::Call("<".to_string()),
                    ])),
                )],
                vec![Slot::typed(SlotType::String)],
            ),
            Body::Composed(vec![
                Instr::Call("drop".to_string()),
                Instr::Push(Literal::String("under nine thousand".to_string())),
            ]),
        ),
    );
    registry.define_word(
        "classify",
        Overload::new(
            Effect::new(
                vec![Slot::typed(SlotType::UnsignedInt)],
                vec![Slot::typed(SlotType::String)],
            ),
            Body::Composed(vec![
                Instr::Call("drop".to_string()),
                Instr::Push(Literal::String("over nine thousand".to_string())),
            ]),
        ),
    );

    registry.define_word(
        "main",
        Overload::new(
            Effect::new(vec![], vec![Slot::typed(SlotType::String)]),
            Body::Composed(vec![
                Instr::Push(Literal::UnsignedInt(42)),
                Instr::Call("classify".to_string()),
            ]),
        ),
    );

    registry
}

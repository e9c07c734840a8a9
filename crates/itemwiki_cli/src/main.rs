//! Command-line front end for the item wiki catalog.
//!
//! # Responsibility
//! - Parse arguments and resolve configuration.
//! - Turn `--user`/`--password` into a session before calling services.
//! - Render results as plain text.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use itemwiki_core::access::{require_role, AuthProvider};
use itemwiki_core::update::{HttpUpdateChannel, Updater};
use itemwiki_core::{
    core_version, import, init_from_config, open_db, AppConfig, CatalogService, CredentialStore,
    ImageStore, ImageUpload, ItemDetails, ItemDraft, ItemSearchFilter, LoginStatus, NewUser,
    RateLimiter, ReferenceDraft, ReferenceKind, Role, Session, SqliteCatalogRepository,
    UserAdminService,
};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "itemwiki", version, about = "Item wiki catalog administration")]
struct Cli {
    /// Config file; falls back to $ITEMWIKI_CONFIG, then ./itemwiki.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, env = "ITEMWIKI_USER")]
    user: Option<String>,
    #[arg(long, global = true, env = "ITEMWIKI_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and the default admin account.
    Init {
        /// Also insert the default reference data.
        #[arg(long)]
        seed: bool,
    },
    #[command(subcommand)]
    Items(ItemCommand),
    #[command(subcommand)]
    Refs(RefCommand),
    /// Import items from a CSV file.
    Import { file: PathBuf },
    /// Write an example import CSV.
    Template {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    #[command(subcommand)]
    Users(UserCommand),
    #[command(subcommand)]
    Update(UpdateCommand),
    /// Catalog counters.
    Dashboard,
    Version,
}

#[derive(Debug, Subcommand)]
enum ItemCommand {
    List,
    Search(SearchArgs),
    Show { id: i64 },
    Add(ItemFields),
    Update {
        id: i64,
        #[command(flatten)]
        patch: ItemPatch,
    },
    Delete { id: i64 },
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long = "type")]
    types: Vec<i64>,
    #[arg(long = "rarity")]
    rarities: Vec<i64>,
    #[arg(long = "location")]
    locations: Vec<i64>,
    #[arg(long = "tier")]
    tiers: Vec<i64>,
}

#[derive(Debug, Args)]
struct ItemFields {
    #[arg(long)]
    name: String,
    #[arg(long = "type")]
    type_id: i64,
    #[arg(long)]
    rarity: i64,
    #[arg(long)]
    location: i64,
    #[arg(long)]
    tier: i64,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ItemPatch {
    #[arg(long)]
    name: Option<String>,
    #[arg(long = "type")]
    type_id: Option<i64>,
    #[arg(long)]
    rarity: Option<i64>,
    #[arg(long)]
    location: Option<i64>,
    #[arg(long)]
    tier: Option<i64>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum RefCommand {
    List {
        #[arg(value_parser = parse_kind)]
        kind: ReferenceKind,
    },
    Add {
        #[arg(value_parser = parse_kind)]
        kind: ReferenceKind,
        name: String,
        #[arg(long)]
        order: Option<i64>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Rename {
        #[arg(value_parser = parse_kind)]
        kind: ReferenceKind,
        id: i64,
        name: String,
    },
    Delete {
        #[arg(value_parser = parse_kind)]
        kind: ReferenceKind,
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    List,
    /// Prints the generated initial password.
    Create {
        username: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, value_parser = parse_role, default_value = "viewer")]
        role: Role,
    },
    /// Prints the generated replacement password.
    Reset { username: String },
    Delete { username: String },
    /// Change the password of the logged-in account.
    Passwd {
        #[arg(long, env = "ITEMWIKI_NEW_PASSWORD", hide_env_values = true)]
        new: String,
    },
}

#[derive(Debug, Subcommand)]
enum UpdateCommand {
    Check,
    /// Install the published bundle when it is newer (admin only).
    Apply {
        /// Reinstall even when the local version is current.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::discover(cli.config.as_deref()).context("failed to load config")?;
    if let Err(err) = init_from_config(&config) {
        eprintln!("warning: file logging disabled: {err}");
    }
    info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    let app = App::new(config, cli.user, cli.password);
    app.run(cli.command)
}

struct App {
    config: AppConfig,
    user: Option<String>,
    password: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl App {
    fn new(config: AppConfig, user: Option<String>, password: Option<String>) -> Self {
        Self {
            config,
            user,
            password,
            limiter: Arc::new(RateLimiter::default()),
        }
    }

    fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Init { seed } => self.init(seed),
            Command::Items(command) => self.items(command),
            Command::Refs(command) => self.refs(command),
            Command::Import { file } => {
                let session = self.session(false)?;
                let input = std::fs::File::open(&file)
                    .with_context(|| format!("failed to open {}", file.display()))?;
                let report = self.catalog()?.import_items(&session, input)?;
                println!("imported {} item(s), {} failed", report.success, report.failed);
                for error in &report.errors {
                    println!("  {error}");
                }
                Ok(())
            }
            Command::Template { output } => {
                let bytes = import::template_csv()?;
                match output {
                    Some(path) => std::fs::write(&path, bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?,
                    None => std::io::stdout().write_all(&bytes)?,
                }
                Ok(())
            }
            Command::Users(command) => self.users(command),
            Command::Update(command) => self.update(command),
            Command::Dashboard => {
                let counts = self.catalog()?.dashboard(&Session::anonymous())?;
                println!("items:          {}", counts.total_items);
                println!("legendary:      {}", counts.legendary_items);
                println!("item types:     {}", counts.item_types);
                println!("rarities:       {}", counts.rarities);
                println!("drop locations: {}", counts.drop_locations);
                println!("tiers:          {}", counts.tiers);
                Ok(())
            }
            Command::Version => {
                println!("itemwiki {}", core_version());
                Ok(())
            }
        }
    }

    fn init(&self, seed: bool) -> Result<()> {
        let db_path = self.config.database_path();
        ensure_parent_dir(&db_path)?;
        let mut conn = open_db(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        if seed {
            itemwiki_core::seed_defaults(&mut conn)?;
        }
        println!("database ready at {}", db_path.display());

        if let Some(password) = self.credentials().bootstrap()? {
            println!("created admin account `admin` with password: {password}");
            println!("the password must be changed at first login");
        }
        Ok(())
    }

    fn items(&self, command: ItemCommand) -> Result<()> {
        let catalog = self.catalog()?;
        match command {
            ItemCommand::List => {
                let session = Session::anonymous();
                catalog.list_items(&session)?.iter().for_each(print_item_row);
            }
            ItemCommand::Search(args) => {
                let filter = ItemSearchFilter {
                    name_contains: args.name,
                    type_ids: args.types,
                    rarity_ids: args.rarities,
                    location_ids: args.locations,
                    tier_ids: args.tiers,
                };
                let items = catalog.search_items(&Session::anonymous(), &filter)?;
                items.iter().for_each(print_item_row);
                println!("{} item(s)", items.len());
            }
            ItemCommand::Show { id } => {
                let item = catalog
                    .get_item(&Session::anonymous(), id)?
                    .ok_or_else(|| anyhow!("item {id} not found"))?;
                print_item_details(&item);
            }
            ItemCommand::Add(fields) => {
                let session = self.session(false)?;
                let draft = ItemDraft::new(
                    fields.name,
                    fields.type_id,
                    fields.rarity,
                    fields.location,
                    fields.tier,
                )
                .with_description(fields.description);
                let upload = fields.image.as_deref().map(read_upload).transpose()?;
                let id = catalog.create_item_with_image(&session, &draft, upload.as_ref())?;
                println!("created item {id}");
            }
            ItemCommand::Update { id, patch } => {
                let session = self.session(false)?;
                let current = catalog
                    .get_item(&session, id)?
                    .ok_or_else(|| anyhow!("item {id} not found"))?;
                let mut draft = current.to_draft();
                draft.image_path = None;
                apply_patch(&mut draft, &patch);
                let upload = patch.image.as_deref().map(read_upload).transpose()?;
                catalog.update_item_with_image(&session, id, &draft, upload.as_ref())?;
                println!("updated item {id}");
            }
            ItemCommand::Delete { id } => {
                let session = self.session(false)?;
                catalog.delete_item(&session, id)?;
                println!("deleted item {id}");
            }
        }
        Ok(())
    }

    fn refs(&self, command: RefCommand) -> Result<()> {
        let catalog = self.catalog()?;
        match command {
            RefCommand::List { kind } => {
                for entry in catalog.list_references(&Session::anonymous(), kind)? {
                    let mut line = format!("{}\t{}", entry.id, entry.name);
                    if let Some(icon) = entry.icon.as_deref() {
                        line = format!("{line}\t{icon}");
                    }
                    if let Some(color) = entry.color.as_deref() {
                        line = format!("{line}\t{color}");
                    }
                    if let Some(description) = entry.description.as_deref() {
                        line = format!("{line}\t{description}");
                    }
                    println!("{line}");
                }
            }
            RefCommand::Add {
                kind,
                name,
                order,
                color,
                icon,
                description,
            } => {
                let session = self.session(false)?;
                let draft = ReferenceDraft {
                    kind,
                    name,
                    display_order: order,
                    color,
                    icon,
                    description,
                };
                let id = catalog.create_reference(&session, &draft)?;
                println!("created {} {id}", kind.label());
            }
            RefCommand::Rename { kind, id, name } => {
                let session = self.session(false)?;
                let current = catalog
                    .list_references(&session, kind)?
                    .into_iter()
                    .find(|entry| entry.id == id)
                    .ok_or_else(|| anyhow!("{} {id} not found", kind.label()))?;
                let draft = ReferenceDraft {
                    kind,
                    name,
                    display_order: current.display_order,
                    color: current.color,
                    icon: current.icon,
                    description: current.description,
                };
                catalog.update_reference(&session, id, &draft)?;
                println!("renamed {} {id}", kind.label());
            }
            RefCommand::Delete { kind, id } => {
                let session = self.session(false)?;
                catalog.delete_reference(&session, kind, id)?;
                println!("deleted {} {id}", kind.label());
            }
        }
        Ok(())
    }

    fn users(&self, command: UserCommand) -> Result<()> {
        let admin = self.user_admin();
        match command {
            UserCommand::List => {
                let session = self.session(false)?;
                for user in admin.list_users(&session)? {
                    let flag = if user.force_password_change {
                        "\tmust change password"
                    } else {
                        ""
                    };
                    println!(
                        "{}\t{}\t{}\t{}{flag}",
                        user.username,
                        user.display_name,
                        user.role.as_str(),
                        user.created_at
                    );
                }
            }
            UserCommand::Create {
                username,
                name,
                email,
                role,
            } => {
                let session = self.session(false)?;
                let user = NewUser {
                    username,
                    display_name: name,
                    email,
                    role,
                };
                let password = admin.create_user(&session, &user)?;
                println!("created `{}` with password: {password}", user.username);
            }
            UserCommand::Reset { username } => {
                let session = self.session(false)?;
                let password = admin.reset_password(&session, &username)?;
                println!("new password for `{username}`: {password}");
            }
            UserCommand::Delete { username } => {
                let session = self.session(false)?;
                admin.delete_user(&session, &username)?;
                println!("deleted `{username}`");
            }
            UserCommand::Passwd { new } => {
                let session = self.session(true)?;
                let current = self.password.as_deref().unwrap_or_default();
                admin.change_own_password(&session, current, &new)?;
                println!("password changed");
            }
        }
        Ok(())
    }

    fn update(&self, command: UpdateCommand) -> Result<()> {
        let channel = HttpUpdateChannel::new(self.config.update.base_url.clone());
        let updater = Updater::new(channel, self.config.install_layout());
        match command {
            UpdateCommand::Check => {
                let check = updater.check()?;
                println!("installed: {}", check.current_version);
                println!("published: {}", check.latest_version);
                if check.has_update {
                    println!("an update is available");
                    if let Some(notes) = check.notes.as_deref() {
                        println!("\n{}", notes.trim());
                    }
                } else {
                    println!("up to date");
                }
            }
            UpdateCommand::Apply { force } => {
                let session = self.session(false)?;
                require_role(&session, &[Role::Admin], |_| Ok::<_, anyhow::Error>(()))?;

                let applied = if force {
                    let latest = updater.check()?.latest_version;
                    Some(updater.apply(&latest)?)
                } else {
                    updater.check_and_apply()?
                };
                match applied {
                    Some(applied) => {
                        println!("installed version {}", applied.version);
                        println!("database replaced: {}", applied.replaced_database);
                        println!("credentials replaced: {}", applied.replaced_credentials);
                        println!("images copied: {}", applied.images_copied);
                        for backup in &applied.backups {
                            println!("backup: {}", backup.display());
                        }
                    }
                    None => println!("already up to date"),
                }
            }
        }
        Ok(())
    }

    fn catalog(&self) -> Result<CatalogService<SqliteCatalogRepository>> {
        let db_path = self.config.database_path();
        ensure_parent_dir(&db_path)?;
        let conn = open_db(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let repo = SqliteCatalogRepository::with_cache_ttl(conn, self.config.reference_cache_ttl())
            .with_placeholder_image(self.config.storage.placeholder_image.clone());

        Ok(
            CatalogService::with_rate_limiter(repo, Arc::clone(&self.limiter))
                .with_image_store(ImageStore::new(self.config.image_dir())),
        )
    }

    fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.config.credentials_path())
    }

    fn user_admin(&self) -> UserAdminService {
        UserAdminService::with_rate_limiter(self.credentials(), Arc::clone(&self.limiter))
    }

    /// Logs in with the global credentials. Accounts flagged for a password
    /// change may only run `users passwd`.
    fn session(&self, allow_password_change: bool) -> Result<Session> {
        let (Some(user), Some(password)) = (self.user.as_deref(), self.password.as_deref()) else {
            return Ok(Session::anonymous());
        };

        let (session, status) = self.credentials().login(user, password)?;
        match status {
            LoginStatus::Success => Ok(session),
            LoginStatus::PasswordChangeRequired if allow_password_change => Ok(session),
            LoginStatus::PasswordChangeRequired => {
                warn!("event=cli_login module=cli status=error reason=password_change_required");
                bail!("password change required; run `itemwiki users passwd --new <password>`")
            }
            LoginStatus::InvalidCredentials => bail!("invalid username or password"),
        }
    }
}

fn apply_patch(draft: &mut ItemDraft, patch: &ItemPatch) {
    if let Some(name) = &patch.name {
        draft.name = name.clone();
    }
    if let Some(id) = patch.type_id {
        draft.type_id = id;
    }
    if let Some(id) = patch.rarity {
        draft.rarity_id = id;
    }
    if let Some(id) = patch.location {
        draft.location_id = id;
    }
    if let Some(id) = patch.tier {
        draft.tier_id = id;
    }
    if let Some(description) = &patch.description {
        draft.description = description.clone();
    }
}

fn read_upload(path: &Path) -> Result<ImageUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ImageUpload { filename, bytes })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn print_item_row(item: &ItemDetails) {
    println!(
        "{}\t{}\t{}\t{} {}\t{}\t{}",
        item.id,
        item.name,
        item.type_name,
        item.rarity_icon,
        item.rarity_name,
        item.location_name,
        item.tier_name
    );
}

fn print_item_details(item: &ItemDetails) {
    println!("{} (#{})", item.name, item.id);
    println!("  type:      {}", item.type_name);
    println!(
        "  rarity:    {} {} ({})",
        item.rarity_icon, item.rarity_name, item.rarity_color
    );
    println!("  location:  {}", item.location_name);
    println!("  tier:      {}", item.tier_name);
    println!("  image:     {}", item.image_path);
    if !item.description.is_empty() {
        println!("\n{}", item.description);
    }
}

fn parse_kind(value: &str) -> Result<ReferenceKind, String> {
    ReferenceKind::parse(value)
        .ok_or_else(|| format!("unknown reference kind `{value}` (type|rarity|location|tier)"))
}

fn parse_role(value: &str) -> Result<Role, String> {
    Role::parse(value).ok_or_else(|| format!("unknown role `{value}` (admin|viewer)"))
}

#[cfg(test)]
mod tests {
    use super::{apply_patch, parse_kind, Cli, ItemPatch};
    use clap::CommandFactory;
    use itemwiki_core::{ItemDraft, ReferenceKind};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn reference_kind_aliases_parse() {
        assert_eq!(parse_kind("location"), Ok(ReferenceKind::DropLocation));
        assert!(parse_kind("weapon").is_err());
    }

    #[test]
    fn patch_only_overrides_given_fields() {
        let mut draft = ItemDraft::new("Iron Sword", 1, 2, 3, 4).with_description("old");
        let patch = ItemPatch {
            name: None,
            type_id: None,
            rarity: Some(5),
            location: None,
            tier: None,
            description: Some("new".to_string()),
            image: None,
        };
        apply_patch(&mut draft, &patch);
        assert_eq!(draft.name, "Iron Sword");
        assert_eq!(draft.rarity_id, 5);
        assert_eq!(draft.description, "new");
    }
}

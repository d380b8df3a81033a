//! Metadata attached to instructions.
//!
//! Metadata never changes the semantics of a program, it only records facts that later
//! optimizations may rely on (aliasing, invariance of loaded values, dereferenceability).

use typed_index_collections::TiVec;

use crate::{AliasDomain, AliasScope, InvariantGroup, TbaaTag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeData {
    pub domain: AliasDomain,
    pub name: String,
}

/// Function wide table of metadata nodes.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    pub scopes: TiVec<AliasScope, ScopeData>,
    pub domains: TiVec<AliasDomain, String>,
    pub tbaa: TiVec<TbaaTag, String>,
    invariant_groups: u32,
}

impl Metadata {
    pub fn make_domain(&mut self, name: String) -> AliasDomain {
        self.domains.push_and_get_key(name)
    }

    pub fn make_scope(&mut self, domain: AliasDomain, name: String) -> AliasScope {
        self.scopes.push_and_get_key(ScopeData { domain, name })
    }

    pub fn make_tbaa_tag(&mut self, name: String) -> TbaaTag {
        self.tbaa.push_and_get_key(name)
    }

    pub fn make_invariant_group(&mut self) -> InvariantGroup {
        let group = InvariantGroup::from(self.invariant_groups);
        self.invariant_groups += 1;
        group
    }
}

/// The kinds of metadata an instruction can carry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MetadataKind {
    AliasScope,
    NoAlias,
    Tbaa,
    TbaaStruct,
    InvariantGroup,
    Dereferenceable,
    NonNull,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstMetadata {
    pub alias_scope: Vec<AliasScope>,
    pub noalias: Vec<AliasScope>,
    pub tbaa: Option<TbaaTag>,
    pub tbaa_struct: Option<TbaaTag>,
    pub invariant_group: Option<InvariantGroup>,
    pub dereferenceable: Option<u64>,
    pub nonnull: bool,
}

impl InstMetadata {
    pub fn is_empty(&self) -> bool {
        *self == InstMetadata::default()
    }

    /// Copies the metadata of the given `kinds` from `src`.
    pub fn copy_from(&mut self, src: &InstMetadata, kinds: &[MetadataKind]) {
        for kind in kinds {
            match kind {
                MetadataKind::AliasScope => self.alias_scope = src.alias_scope.clone(),
                MetadataKind::NoAlias => self.noalias = src.noalias.clone(),
                MetadataKind::Tbaa => self.tbaa = src.tbaa,
                MetadataKind::TbaaStruct => self.tbaa_struct = src.tbaa_struct,
                MetadataKind::InvariantGroup => self.invariant_group = src.invariant_group,
                MetadataKind::Dereferenceable => self.dereferenceable = src.dereferenceable,
                MetadataKind::NonNull => self.nonnull = src.nonnull,
            }
        }
    }
}

//! Embedded C runtime helpers
//!
//! Each snippet is emitted at most once, and only when the program actually
//! uses the feature it supports.

/// Generic array of `void*` backing mixed-type array literals
pub const DYNAMIC_ARRAY: &str = r"typedef struct {
    void** data;
    int length;
    int capacity;
} DynamicArray;

static DynamicArray* dyn_array_new(void) {
    DynamicArray* arr = malloc(sizeof(DynamicArray));
    arr->capacity = 8;
    arr->length = 0;
    arr->data = malloc(sizeof(void*) * arr->capacity);
    return arr;
}

static void dyn_array_push(DynamicArray* arr, void* value) {
    if (arr->length == arr->capacity) {
        arr->capacity *= 2;
        arr->data = realloc(arr->data, sizeof(void*) * arr->capacity);
    }
    arr->data[arr->length++] = value;
}
";

/// Hash map type and prototypes; the definitions land with the other helpers
pub const HASHMAP_FORWARD: &str = r"#define HASHMAP_BUCKETS 64

typedef struct HashMapEntry {
    const char* key;
    void* value;
    struct HashMapEntry* next;
} HashMapEntry;

typedef struct {
    HashMapEntry* buckets[HASHMAP_BUCKETS];
} HashMap;

static HashMap* hashMapNew(void);
static void hashMapPut(HashMap* map, const char* key, void* value);
static void* hashMapGet(HashMap* map, const char* key);
";

/// Chained-bucket hash map with the djb2 string hash
pub const HASHMAP_IMPL: &str = r"static unsigned long hashMapHash(const char* key) {
    unsigned long hash = 5381;
    int c;
    while ((c = *key++)) {
        hash = ((hash << 5) + hash) + c;
    }
    return hash;
}

static HashMap* hashMapNew(void) {
    return calloc(1, sizeof(HashMap));
}

static void hashMapPut(HashMap* map, const char* key, void* value) {
    unsigned long idx = hashMapHash(key) % HASHMAP_BUCKETS;
    for (HashMapEntry* e = map->buckets[idx]; e != NULL; e = e->next) {
        if (strcmp(e->key, key) == 0) {
            e->value = value;
            return;
        }
    }
    HashMapEntry* entry = malloc(sizeof(HashMapEntry));
    entry->key = key;
    entry->value = value;
    entry->next = map->buckets[idx];
    map->buckets[idx] = entry;
}

static void* hashMapGet(HashMap* map, const char* key) {
    unsigned long idx = hashMapHash(key) % HASHMAP_BUCKETS;
    for (HashMapEntry* e = map->buckets[idx]; e != NULL; e = e->next) {
        if (strcmp(e->key, key) == 0) {
            return e->value;
        }
    }
    return NULL;
}
";

/// Int array used by literals and the method chain
pub const AHOY_ARRAY_CORE: &str = r"typedef struct {
    int* data;
    int length;
    int capacity;
} AhoyArray;

static AhoyArray* ahoy_array_new(void) {
    AhoyArray* arr = malloc(sizeof(AhoyArray));
    arr->capacity = 8;
    arr->length = 0;
    arr->data = malloc(sizeof(int) * arr->capacity);
    return arr;
}
";

/// One-time RNG seeding for shuffle/pick
pub const RNG_SEED: &str = r"static void ahoy_array_seed(void) {
    static int seeded = 0;
    if (!seeded) {
        srand((unsigned)time(NULL));
        seeded = 1;
    }
}
";

/// Formats an array as `[a, b, c]` for `%v` printing
pub const PRINT_ARRAY_HELPER: &str = r#"static char* __print_array_helper(AhoyArray* arr) {
    char* buf = malloc((size_t)arr->length * 16 + 4);
    char* p = buf;
    *p++ = '[';
    for (int i = 0; i < arr->length; i++) {
        if (i > 0) {
            p += sprintf(p, ", ");
        }
        p += sprintf(p, "%d", arr->data[i]);
    }
    *p++ = ']';
    *p = '\0';
    return buf;
}
"#;

const PUSH: &str = r"static AhoyArray* ahoy_array_push(AhoyArray* arr, int value) {
    if (arr->length == arr->capacity) {
        arr->capacity *= 2;
        arr->data = realloc(arr->data, sizeof(int) * arr->capacity);
    }
    arr->data[arr->length++] = value;
    return arr;
}
";

const LENGTH: &str = r"static int ahoy_array_length(AhoyArray* arr) {
    return arr->length;
}
";

const POP: &str = r"static int ahoy_array_pop(AhoyArray* arr) {
    if (arr->length == 0) {
        return 0;
    }
    return arr->data[--arr->length];
}
";

const SUM: &str = r"static int ahoy_array_sum(AhoyArray* arr) {
    int total = 0;
    for (int i = 0; i < arr->length; i++) {
        total += arr->data[i];
    }
    return total;
}
";

const HAS: &str = r"static int ahoy_array_has(AhoyArray* arr, int value) {
    for (int i = 0; i < arr->length; i++) {
        if (arr->data[i] == value) {
            return 1;
        }
    }
    return 0;
}
";

const SORT: &str = r"static int ahoy_array_cmp(const void* a, const void* b) {
    return *(const int*)a - *(const int*)b;
}

static AhoyArray* ahoy_array_sort(AhoyArray* arr) {
    qsort(arr->data, (size_t)arr->length, sizeof(int), ahoy_array_cmp);
    return arr;
}
";

const REVERSE: &str = r"static AhoyArray* ahoy_array_reverse(AhoyArray* arr) {
    for (int i = 0, j = arr->length - 1; i < j; i++, j--) {
        int tmp = arr->data[i];
        arr->data[i] = arr->data[j];
        arr->data[j] = tmp;
    }
    return arr;
}
";

// Fisher-Yates
const SHUFFLE: &str = r"static AhoyArray* ahoy_array_shuffle(AhoyArray* arr) {
    ahoy_array_seed();
    for (int i = arr->length - 1; i > 0; i--) {
        int j = rand() % (i + 1);
        int tmp = arr->data[i];
        arr->data[i] = arr->data[j];
        arr->data[j] = tmp;
    }
    return arr;
}
";

const PICK: &str = r"static int ahoy_array_pick(AhoyArray* arr) {
    ahoy_array_seed();
    if (arr->length == 0) {
        return 0;
    }
    return arr->data[rand() % arr->length];
}
";

/// Canonical name of an array method with a runtime helper.
///
/// `map` and `filter` are array methods too, but they expand inline and have
/// no helper here.
pub fn canonical_method(name: &str) -> Option<&'static str> {
    match name {
        "push" => Some("push"),
        "length" => Some("length"),
        "pop" => Some("pop"),
        "sum" => Some("sum"),
        "has" => Some("has"),
        "sort" => Some("sort"),
        "reverse" => Some("reverse"),
        "shuffle" => Some("shuffle"),
        "pick" => Some("pick"),
        _ => None,
    }
}

/// The helper implementation for a canonical method name
pub fn method_helper(name: &str) -> &'static str {
    match name {
        "push" => PUSH,
        "length" => LENGTH,
        "pop" => POP,
        "sum" => SUM,
        "has" => HAS,
        "sort" => SORT,
        "reverse" => REVERSE,
        "shuffle" => SHUFFLE,
        "pick" => PICK,
        _ => unreachable!("unknown array method helper: {name}"),
    }
}

/// Does the method pull RNG seeding (and `<time.h>`) into the output?
pub fn method_needs_rng(name: &str) -> bool {
    matches!(name, "shuffle" | "pick")
}
